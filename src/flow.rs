//! A validated, immutable flow definition.

use std::fmt;
use std::sync::Arc;

use tracing::{instrument, warn};

use crate::error::{FlowError, ValidationError};
use crate::states::State;
use crate::transition_table::TransitionTable;

#[derive(Debug)]
struct FlowDefinition {
  name: String,
  start: String,
  table: TransitionTable,
}

/// A named transition table with a start state.
///
/// Only validated tables become flows, and a flow never changes afterwards. Cloning is cheap;
/// clones share the same definition, so any number of job runs can execute it concurrently.
#[derive(Clone)]
pub struct Flow {
  inner: Arc<FlowDefinition>,
}

impl Flow {
  /// Validates `table` and freezes it.
  ///
  /// Fails with [FlowError::Configuration] listing every problem found.
  #[instrument(level = "trace", skip(name, start, table))]
  pub fn new(
    name: impl Into<String>,
    start: impl Into<String>,
    table: TransitionTable,
  ) -> Result<Self, FlowError> {
    let name = name.into();
    let start = start.into();
    let mut errors = table.validate();
    if !table.contains(&start) {
      errors.push(ValidationError::MissingStart {
        start: start.clone(),
      });
    }
    if !errors.is_empty() {
      return Err(FlowError::Configuration(errors));
    }

    let reachable = table.reachable_from(&start);
    for state in table.state_names() {
      if !reachable.contains(state) {
        warn!(flow = %name, state, "state is unreachable from the start state");
      }
    }

    Ok(Self {
      inner: Arc::new(FlowDefinition { name, start, table }),
    })
  }

  pub fn name(&self) -> &str {
    &self.inner.name
  }

  pub fn start(&self) -> &str {
    &self.inner.start
  }

  pub fn table(&self) -> &TransitionTable {
    &self.inner.table
  }

  pub fn state(&self, name: &str) -> Option<&State> {
    self.inner.table.state(name)
  }
}

impl fmt::Debug for Flow {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Flow")
      .field("name", &self.inner.name)
      .field("start", &self.inner.start)
      .field("states", &self.inner.table.state_names().count())
      .finish()
  }
}
