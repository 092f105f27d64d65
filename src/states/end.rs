//! Terminal states: end, fail and stop.

use tracing::info;

use crate::types::{ExecutionContext, ExitStatus, FlowStatus};

/// Ends the flow with a fixed status.
#[derive(Debug, Clone, PartialEq)]
pub struct EndState {
  status: FlowStatus,
  exit_code: Option<ExitStatus>,
  restart: Option<String>,
}

impl EndState {
  pub fn new(status: FlowStatus) -> Self {
    Self {
      status,
      exit_code: None,
      restart: None,
    }
  }

  pub fn completed() -> Self {
    Self::new(FlowStatus::Completed)
  }

  pub fn failed() -> Self {
    Self::new(FlowStatus::Failed)
  }

  pub fn stopped() -> Self {
    Self::new(FlowStatus::Stopped)
  }

  /// Reports `code` instead of the status marker.
  pub fn with_exit_code(mut self, code: impl Into<ExitStatus>) -> Self {
    self.exit_code = Some(code.into());
    self
  }

  /// For stop states: the state a restart of the run continues at.
  pub fn with_restart(mut self, state: impl Into<String>) -> Self {
    self.restart = Some(state.into());
    self
  }

  pub fn status(&self) -> FlowStatus {
    self.status
  }

  pub fn restart(&self) -> Option<&str> {
    self.restart.as_deref()
  }

  pub fn exit_status(&self) -> ExitStatus {
    self
      .exit_code
      .clone()
      .unwrap_or_else(|| self.status.exit_status())
  }

  pub(crate) fn execute(&self, flow_path: &str, ctx: &mut ExecutionContext) -> ExitStatus {
    if self.status == FlowStatus::Stopped
      && let Some(target) = &self.restart
    {
      info!(restart_at = %target, "stop state sets restart target");
      ctx.set_resume_target(flow_path, target);
    }
    self.exit_status()
  }
}
