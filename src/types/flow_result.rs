//! What a caller gets back from running a flow.

use uuid::Uuid;

use super::{ExecutionContext, ExitStatus, FlowStatus, StepFailure};
use crate::error::{FailureKind, FlowError};

/// Why a run ended `Failed`.
#[derive(Debug, Clone, PartialEq)]
pub struct RunFailure {
  /// Configuration-time or run-time.
  pub kind: FailureKind,
  /// The fatal error that aborted the run, if the failure was not a routed outcome.
  pub error: Option<FlowError>,
  /// Step delegate failures recorded during the run, oldest first.
  pub step_failures: Vec<StepFailure>,
}

impl RunFailure {
  /// Failure reached by routing to a fail state or the `FAILED` marker.
  pub fn routed(step_failures: Vec<StepFailure>) -> Self {
    Self {
      kind: FailureKind::Runtime,
      error: None,
      step_failures,
    }
  }

  pub fn fatal(error: FlowError, step_failures: Vec<StepFailure>) -> Self {
    Self {
      kind: error.kind(),
      error: Some(error),
      step_failures,
    }
  }

  /// Human readable cause chain, outermost first.
  pub fn chain(&self) -> Vec<String> {
    let mut chain = Vec::new();
    if let Some(error) = &self.error {
      chain.push(error.to_string());
    }
    for failure in self.step_failures.iter().rev() {
      chain.push(format!("{}: {}", failure.state, failure.message));
      chain.extend(failure.causes.iter().cloned());
    }
    chain
  }
}

/// Final result of a job run.
#[derive(Debug, Clone)]
pub struct FlowResult {
  pub job_run_id: Uuid,
  pub status: FlowStatus,
  /// Exit status of the last executed state (or of the terminal marker reached).
  pub exit_status: ExitStatus,
  /// Context after the run; hand it to `resume` to restart.
  pub context: ExecutionContext,
  /// Set iff `status` is `Failed`.
  pub failure: Option<RunFailure>,
}

impl FlowResult {
  pub fn is_completed(&self) -> bool {
    self.status == FlowStatus::Completed
  }

  pub fn is_failed(&self) -> bool {
    self.status == FlowStatus::Failed
  }

  pub fn is_stopped(&self) -> bool {
    self.status == FlowStatus::Stopped
  }

  /// The fatal error, if the run was aborted.
  pub fn error(&self) -> Option<&FlowError> {
    self.failure.as_ref().and_then(|f| f.error.as_ref())
  }
}
