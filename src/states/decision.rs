//! Decision state: routes on a pure function of the context.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::types::{ExecutionContext, ExitStatus};

/// Pure routing function. Must not have side effects; the executor records its result.
pub trait Decider: Send + Sync {
  fn decide(&self, ctx: &ExecutionContext) -> ExitStatus;
}

impl<F> Decider for F
where
  F: Fn(&ExecutionContext) -> ExitStatus + Send + Sync,
{
  fn decide(&self, ctx: &ExecutionContext) -> ExitStatus {
    self(ctx)
  }
}

pub struct DecisionState {
  decider: Arc<dyn Decider>,
}

impl DecisionState {
  pub fn new(decider: impl Decider + 'static) -> Self {
    Self {
      decider: Arc::new(decider),
    }
  }

  pub(crate) fn execute(&self, ctx: &ExecutionContext) -> ExitStatus {
    let exit = self.decider.decide(ctx);
    debug!(exit_status = %exit, "decision made");
    exit
  }
}

impl fmt::Debug for DecisionState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("DecisionState").finish_non_exhaustive()
  }
}
