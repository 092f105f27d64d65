//! Per-step bookkeeping kept in the execution context for restart decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ExitStatus;

/// Lifecycle of one step within a job run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
  /// Started and not yet finished; a run interrupted here resumes at this step.
  Started,
  Completed,
  Failed,
  Stopped,
}

impl StepStatus {
  /// Maps a step's exit status to the status recorded for it.
  pub fn from_exit(exit: &ExitStatus) -> Self {
    if exit.is_failed() {
      StepStatus::Failed
    } else if exit.is_stopped() {
      StepStatus::Stopped
    } else {
      StepStatus::Completed
    }
  }
}

/// What the context remembers about one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
  pub status: StepStatus,
  pub exit_status: Option<ExitStatus>,
  /// Whether the step may be executed again when the run is restarted.
  pub restartable: bool,
  /// Whether a completed step is executed again when a restart routes through it.
  pub allow_start_if_complete: bool,
  /// Number of times the step has been started, across restarts.
  pub start_count: u32,
  /// Skippable failures absorbed so far.
  pub skip_count: u32,
  /// Restart count of the run when the step last started.
  #[serde(default)]
  pub generation: u32,
  pub started_at: DateTime<Utc>,
  pub ended_at: Option<DateTime<Utc>>,
}

impl StepRecord {
  pub fn started(restartable: bool, allow_start_if_complete: bool) -> Self {
    Self {
      status: StepStatus::Started,
      exit_status: None,
      restartable,
      allow_start_if_complete,
      start_count: 0,
      skip_count: 0,
      generation: 0,
      started_at: Utc::now(),
      ended_at: None,
    }
  }

  pub fn is_complete(&self) -> bool {
    self.status == StepStatus::Completed
  }

  pub fn finish(&mut self, exit: ExitStatus) {
    self.status = StepStatus::from_exit(&exit);
    self.exit_status = Some(exit);
    self.ended_at = Some(Utc::now());
  }
}

/// A step delegate failure, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepFailure {
  /// Qualified state key of the failing step.
  pub state: String,
  pub message: String,
  /// Source chain of the error, outermost first (excluding `message`).
  pub causes: Vec<String>,
  /// 1-based attempt that produced this failure.
  pub attempt: u32,
  pub at: DateTime<Utc>,
}

impl StepFailure {
  pub fn from_error(
    state: impl Into<String>,
    error: &(dyn std::error::Error + 'static),
    attempt: u32,
  ) -> Self {
    let mut causes = Vec::new();
    let mut source = error.source();
    while let Some(cause) = source {
      causes.push(cause.to_string());
      source = cause.source();
    }
    Self {
      state: state.into(),
      message: error.to_string(),
      causes,
      attempt,
      at: Utc::now(),
    }
  }

  /// True if `needle` appears in the message or any cause.
  pub fn mentions(&self, needle: &str) -> bool {
    self.message.contains(needle) || self.causes.iter().any(|c| c.contains(needle))
  }
}

/// One entry of the visit history: a state executed and what it reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateVisit {
  pub state: String,
  pub exit_status: ExitStatus,
  pub at: DateTime<Utc>,
}
