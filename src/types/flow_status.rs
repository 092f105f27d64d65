//! Terminal status of a job run and the phases the executor moves through.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::ExitStatus;

/// Terminal status of a flow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlowStatus {
  Completed,
  Failed,
  Stopped,
}

impl FlowStatus {
  /// Terminal marker name usable as a transition target.
  pub fn marker(&self) -> &'static str {
    match self {
      FlowStatus::Completed => ExitStatus::COMPLETED,
      FlowStatus::Failed => ExitStatus::FAILED,
      FlowStatus::Stopped => ExitStatus::STOPPED,
    }
  }

  /// Parses a terminal marker name. Case-sensitive, like pattern matching.
  pub fn from_marker(name: &str) -> Option<Self> {
    match name {
      ExitStatus::COMPLETED => Some(FlowStatus::Completed),
      ExitStatus::FAILED => Some(FlowStatus::Failed),
      ExitStatus::STOPPED => Some(FlowStatus::Stopped),
      _ => None,
    }
  }

  pub fn exit_status(&self) -> ExitStatus {
    ExitStatus::new(self.marker())
  }
}

impl fmt::Display for FlowStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      FlowStatus::Completed => write!(f, "completed"),
      FlowStatus::Failed => write!(f, "failed"),
      FlowStatus::Stopped => write!(f, "stopped"),
    }
  }
}

/// Phase of one job run inside the executor.
///
/// Legal moves:
/// - `NotStarted` -> `Running`
/// - `Running` -> `PausedForSplit` -> `Running`
/// - `Running` | `PausedForSplit` -> `Completed` | `Failed` | `Stopped`
/// - `NotStarted` -> `Failed` (a restart refused before the first state)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowPhase {
  NotStarted,
  Running,
  PausedForSplit,
  Completed,
  Failed,
  Stopped,
}

impl FlowPhase {
  pub fn is_terminal(&self) -> bool {
    matches!(
      self,
      FlowPhase::Completed | FlowPhase::Failed | FlowPhase::Stopped
    )
  }

  pub fn can_transition_to(&self, next: FlowPhase) -> bool {
    use FlowPhase::*;
    match (self, next) {
      (NotStarted, Running) | (NotStarted, Failed) => true,
      (Running, PausedForSplit) | (PausedForSplit, Running) => true,
      (Running | PausedForSplit, Completed | Failed | Stopped) => true,
      _ => false,
    }
  }
}

impl From<FlowStatus> for FlowPhase {
  fn from(status: FlowStatus) -> Self {
    match status {
      FlowStatus::Completed => FlowPhase::Completed,
      FlowStatus::Failed => FlowPhase::Failed,
      FlowStatus::Stopped => FlowPhase::Stopped,
    }
  }
}
