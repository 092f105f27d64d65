//! Sub-flow state: runs an embedded flow on the same context.

use futures::future::BoxFuture;
use tracing::debug;

use super::StateScope;
use crate::error::FlowError;
use crate::executor::run_flow;
use crate::flow::Flow;
use crate::types::ExitStatus;

/// Runs `flow` to its end. Its states are keyed below this state's key, and the exit status of
/// the terminal state it reaches becomes this state's exit status.
#[derive(Debug, Clone)]
pub struct SubFlowState {
  flow: Flow,
}

impl SubFlowState {
  pub fn new(flow: Flow) -> Self {
    Self { flow }
  }

  pub fn flow(&self) -> &Flow {
    &self.flow
  }

  pub(crate) fn execute<'a>(
    &'a self,
    scope: StateScope<'a>,
  ) -> BoxFuture<'a, Result<ExitStatus, FlowError>> {
    Box::pin(async move {
      let outcome = run_flow(&self.flow, scope.key, scope.ctx, scope.env).await?;
      debug!(
        state = scope.key,
        flow = self.flow.name(),
        status = %outcome.status,
        "sub-flow finished"
      );
      Ok(outcome.exit_status)
    })
  }
}
