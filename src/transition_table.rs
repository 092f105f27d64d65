//! States registered by name plus the ordered transitions between them.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::{instrument, trace};

use crate::error::{FlowError, ValidationError};
use crate::pattern;
use crate::states::State;
use crate::types::{ExitStatus, FlowStatus, Transition};

/// Where a flow continues after a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next<'a> {
  /// A registered state.
  State(&'a str),
  /// A terminal marker: the flow ends with this status.
  End(FlowStatus),
}

/// Registry of states and routing rules for one flow.
///
/// Build it, then hand it to [Flow::new](crate::Flow::new), which validates and freezes it.
#[derive(Debug, Default)]
pub struct TransitionTable {
  states: HashMap<String, State>,
  order: Vec<String>,
  transitions: Vec<Transition>,
}

impl TransitionTable {
  pub fn new() -> Self {
    Self::default()
  }

  /// Registers a state under a unique name.
  pub fn register(&mut self, name: impl Into<String>, state: State) -> Result<(), FlowError> {
    let name = name.into();
    if self.states.contains_key(&name) {
      return Err(FlowError::DuplicateState(name));
    }
    self.order.push(name.clone());
    self.states.insert(name, state);
    Ok(())
  }

  /// Appends a transition. The source and target may be registered later.
  pub fn add_transition(
    &mut self,
    from: impl Into<String>,
    pattern: impl Into<String>,
    to: impl Into<String>,
  ) {
    self.transitions.push(Transition::new(from, pattern, to));
  }

  /// Builder form of [register](Self::register) and [add_transition](Self::add_transition):
  /// registers `name` with its outgoing `(pattern, target)` rules.
  pub fn with_state<'a>(
    mut self,
    name: &str,
    state: State,
    transitions: impl IntoIterator<Item = (&'a str, &'a str)>,
  ) -> Result<Self, FlowError> {
    self.register(name, state)?;
    for (pattern, to) in transitions {
      self.add_transition(name, pattern, to);
    }
    Ok(self)
  }

  pub fn state(&self, name: &str) -> Option<&State> {
    self.states.get(name)
  }

  pub fn contains(&self, name: &str) -> bool {
    self.states.contains_key(name)
  }

  /// State names in registration order.
  pub fn state_names(&self) -> impl Iterator<Item = &str> {
    self.order.iter().map(String::as_str)
  }

  pub fn transitions(&self) -> &[Transition] {
    &self.transitions
  }

  /// Transitions leaving `from`, in declaration order.
  pub fn outgoing(&self, from: &str) -> impl Iterator<Item = &Transition> {
    self.transitions.iter().filter(move |t| t.from == from)
  }

  fn resolves(&self, target: &str) -> bool {
    self.states.contains_key(target) || FlowStatus::from_marker(target).is_some()
  }

  /// Checks the table for consistency. An empty result means the table is valid.
  #[instrument(level = "trace", skip(self))]
  pub fn validate(&self) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    for name in &self.order {
      if name.is_empty() {
        errors.push(ValidationError::EmptyStateName);
      } else if FlowStatus::from_marker(name).is_some() {
        errors.push(ValidationError::ReservedStateName { name: name.clone() });
      }
    }

    for t in &self.transitions {
      if t.pattern.is_empty() {
        errors.push(ValidationError::EmptyPattern {
          from: t.from.clone(),
          to: t.to.clone(),
        });
      } else if !pattern::is_valid(&t.pattern) {
        errors.push(ValidationError::InvalidPattern {
          from: t.from.clone(),
          pattern: t.pattern.clone(),
        });
      }
      if !self.states.contains_key(&t.from) {
        errors.push(ValidationError::UnknownSource {
          from: t.from.clone(),
          pattern: t.pattern.clone(),
        });
      }
      if t.to.is_empty() {
        errors.push(ValidationError::EmptyTarget {
          from: t.from.clone(),
          pattern: t.pattern.clone(),
        });
      } else if !self.resolves(&t.to) {
        errors.push(ValidationError::MissingTarget {
          from: t.from.clone(),
          pattern: t.pattern.clone(),
          to: t.to.clone(),
        });
      }
    }

    for name in &self.order {
      let Some(state) = self.states.get(name) else {
        continue;
      };
      let has_outgoing = self.outgoing(name).next().is_some();
      match state {
        State::End(end) => {
          if has_outgoing {
            errors.push(ValidationError::TransitionFromTerminal {
              state: name.clone(),
            });
          }
          if let Some(target) = end.restart()
            && !self.states.contains_key(target)
          {
            errors.push(ValidationError::UnknownRestartTarget {
              state: name.clone(),
              target: target.to_string(),
            });
          }
        }
        State::Split(split) => {
          if !has_outgoing {
            errors.push(ValidationError::NoTransitions {
              state: name.clone(),
            });
          }
          let mut seen = HashSet::new();
          for branch in split.branches() {
            if !seen.insert(branch.name()) {
              errors.push(ValidationError::DuplicateBranch {
                state: name.clone(),
                flow: branch.name().to_string(),
              });
            }
          }
        }
        _ => {
          if !has_outgoing {
            errors.push(ValidationError::NoTransitions {
              state: name.clone(),
            });
          }
        }
      }
    }

    trace!(errors = errors.len(), "transition table validated");
    errors
  }

  /// Resolves the state or terminal marker that follows `from` when it reported `exit_status`.
  ///
  /// The most specific matching pattern wins; ties go to the transition declared first.
  #[instrument(level = "trace", skip(self))]
  pub fn resolve_next(&self, from: &str, exit_status: &ExitStatus) -> Result<Next<'_>, FlowError> {
    let candidates: Vec<&Transition> = self.outgoing(from).collect();
    let unresolved = || FlowError::UnresolvedTransition {
      state: from.to_string(),
      exit_status: exit_status.code().to_string(),
    };
    let idx = pattern::best_match(
      candidates.iter().map(|t| t.pattern.as_str()),
      exit_status.code(),
    )
    .ok_or_else(unresolved)?;
    let target = candidates[idx].to.as_str();
    if let Some((name, _)) = self.states.get_key_value(target) {
      return Ok(Next::State(name.as_str()));
    }
    FlowStatus::from_marker(target)
      .map(Next::End)
      .ok_or_else(unresolved)
  }

  /// States reachable from `start` through declared transitions and stop restart targets.
  pub fn reachable_from(&self, start: &str) -> HashSet<&str> {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::new();
    if let Some((name, _)) = self.states.get_key_value(start) {
      queue.push_back(name.as_str());
    }
    while let Some(name) = queue.pop_front() {
      if !seen.insert(name) {
        continue;
      }
      let restart = match self.states.get(name) {
        Some(State::End(end)) => end.restart(),
        _ => None,
      };
      let targets = self
        .outgoing(name)
        .map(|t| t.to.as_str())
        .chain(restart);
      for target in targets {
        if let Some((next, _)) = self.states.get_key_value(target) {
          queue.push_back(next.as_str());
        }
      }
    }
    seen
  }
}
