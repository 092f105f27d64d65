//! Error taxonomy of the flow engine.
//!
//! - Configuration errors ([ValidationError], [FlowError::DuplicateState]) surface before any
//!   state runs.
//! - Routing and infrastructure errors abort the current job run.
//! - Step delegate errors ([StepError]) never abort by themselves: a step turns them into a
//!   `FAILED` exit status that is routed like any other.

use std::fmt;

use thiserror::Error;

/// A configuration consistency problem found by `TransitionTable::validate`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
  #[error("state name must not be empty")]
  EmptyStateName,

  #[error("'{name}' is a terminal marker and cannot name a state")]
  ReservedStateName { name: String },

  #[error("transition from '{from}' to '{to}' has an empty pattern")]
  EmptyPattern { from: String, to: String },

  #[error("transition from '{from}' has an empty target")]
  EmptyTarget { from: String, pattern: String },

  #[error("pattern '{pattern}' on '{from}' may only end in '*'")]
  InvalidPattern { from: String, pattern: String },

  #[error("transition '{pattern}' declared on unknown state '{from}'")]
  UnknownSource { from: String, pattern: String },

  #[error("transition '{from}' --{pattern}--> '{to}' targets no registered state or marker")]
  MissingTarget {
    from: String,
    pattern: String,
    to: String,
  },

  #[error("state '{state}' has no outgoing transitions")]
  NoTransitions { state: String },

  #[error("terminal state '{state}' cannot have outgoing transitions")]
  TransitionFromTerminal { state: String },

  #[error("start state '{start}' is not registered")]
  MissingStart { start: String },

  #[error("stop state '{state}' restarts at unknown state '{target}'")]
  UnknownRestartTarget { state: String, target: String },

  #[error("split '{state}' declares branch flow '{flow}' more than once")]
  DuplicateBranch { state: String, flow: String },
}

/// Whether a failure was caused by configuration or happened while running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
  Configuration,
  Runtime,
}

impl fmt::Display for FailureKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      FailureKind::Configuration => write!(f, "configuration"),
      FailureKind::Runtime => write!(f, "runtime"),
    }
  }
}

/// Fatal errors of the flow engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FlowError {
  #[error("state '{0}' is already registered")]
  DuplicateState(String),

  #[error("invalid flow configuration: {}", join_errors(.0))]
  Configuration(Vec<ValidationError>),

  #[error("no transition from '{state}' matches exit status '{exit_status}'")]
  UnresolvedTransition { state: String, exit_status: String },

  #[error("state '{0}' is not part of the flow")]
  UnknownState(String),

  #[error("step '{0}' is not restartable")]
  NonRestartableStep(String),

  #[error("step '{state}' reached its start limit of {limit}")]
  StartLimitExceeded { state: String, limit: u32 },

  #[error("job run {0} already completed")]
  AlreadyCompleted(String),

  #[error("step '{state}' failed after {attempts} attempts: {message}")]
  RetryExhausted {
    state: String,
    attempts: u32,
    message: String,
  },

  #[error("step '{state}' exceeded its skip limit of {limit}")]
  SkipLimitExceeded { state: String, limit: u32 },

  #[error("split '{state}' branch '{branch}' failed: {message}")]
  SplitBranch {
    state: String,
    branch: String,
    message: String,
  },

  #[error("flow '{flow}' exceeded {limit} transitions")]
  TransitionLimitExceeded { flow: String, limit: u32 },

  #[error("repository error: {0}")]
  Repository(String),
}

impl FlowError {
  pub fn kind(&self) -> FailureKind {
    match self {
      FlowError::DuplicateState(_) | FlowError::Configuration(_) | FlowError::UnknownState(_) => {
        FailureKind::Configuration
      }
      _ => FailureKind::Runtime,
    }
  }

  pub fn is_configuration(&self) -> bool {
    self.kind() == FailureKind::Configuration
  }
}

fn join_errors(errors: &[ValidationError]) -> String {
  errors
    .iter()
    .map(ToString::to_string)
    .collect::<Vec<_>>()
    .join("; ")
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure reported by a step delegate.
///
/// Retryable unless marked [fatal](StepError::fatal); skippable only when marked
/// [skippable](StepError::skippable).
#[derive(Debug, Error)]
#[error("{message}")]
pub struct StepError {
  message: String,
  retryable: bool,
  skippable: bool,
  #[source]
  cause: Option<BoxError>,
}

impl StepError {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
      retryable: true,
      skippable: false,
      cause: None,
    }
  }

  /// Wraps an underlying error, keeping it as the source of the chain.
  pub fn caused_by(message: impl Into<String>, cause: impl Into<BoxError>) -> Self {
    Self {
      cause: Some(cause.into()),
      ..Self::new(message)
    }
  }

  /// Never retried.
  pub fn fatal(mut self) -> Self {
    self.retryable = false;
    self
  }

  /// May be absorbed by the step's skip limit.
  pub fn skippable(mut self) -> Self {
    self.skippable = true;
    self
  }

  pub fn message(&self) -> &str {
    &self.message
  }

  pub fn is_retryable(&self) -> bool {
    self.retryable
  }

  pub fn is_skippable(&self) -> bool {
    self.skippable
  }
}

impl From<std::io::Error> for StepError {
  fn from(err: std::io::Error) -> Self {
    StepError::caused_by("i/o error", err)
  }
}

impl From<serde_json::Error> for StepError {
  fn from(err: serde_json::Error) -> Self {
    StepError::caused_by("serialization error", err).fatal()
  }
}
