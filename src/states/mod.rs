//! State variants of a flow.
//!
//! [State] is a tagged union with a single operation, `execute`, which reports an
//! [ExitStatus]. The executor routes that status through the transition table.

mod decision;
mod end;
#[cfg(test)]
mod end_test;
mod split;
mod step;
#[cfg(test)]
mod step_test;
mod sub_flow;

use std::any::Any;
use std::fmt;
use std::time::Duration;

use futures::future::BoxFuture;

pub use decision::{Decider, DecisionState};
pub use end::EndState;
pub use split::SplitState;
pub use step::{StepContext, StepState, Tasklet, TaskletFn, tasklet_fn};
pub use sub_flow::SubFlowState;

use crate::error::FlowError;
use crate::executor::RunEnv;
use crate::flow::Flow;
use crate::types::{ExecutionContext, ExitStatus, FlowStatus};

/// Kind of a state, for logging and introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
  Step,
  Decision,
  SubFlow,
  Split,
  End,
  Fail,
  Stop,
}

impl fmt::Display for StateKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      StateKind::Step => "step",
      StateKind::Decision => "decision",
      StateKind::SubFlow => "flow",
      StateKind::Split => "split",
      StateKind::End => "end",
      StateKind::Fail => "fail",
      StateKind::Stop => "stop",
    };
    f.write_str(s)
  }
}

/// What a state gets while it executes.
pub(crate) struct StateScope<'a> {
  /// Qualified key of the state (`parent.child` inside nested flows).
  pub key: &'a str,
  /// Path of the flow the state belongs to.
  pub flow_path: &'a str,
  pub ctx: &'a mut ExecutionContext,
  pub env: &'a RunEnv,
}

/// A unit of a flow.
#[derive(Debug)]
pub enum State {
  Step(StepState),
  Decision(DecisionState),
  SubFlow(SubFlowState),
  Split(SplitState),
  End(EndState),
}

impl State {
  pub fn step(tasklet: impl Tasklet + 'static) -> Self {
    State::Step(StepState::new(tasklet))
  }

  pub fn decision(decider: impl Decider + 'static) -> Self {
    State::Decision(DecisionState::new(decider))
  }

  pub fn sub_flow(flow: Flow) -> Self {
    State::SubFlow(SubFlowState::new(flow))
  }

  pub fn split(branches: Vec<Flow>) -> Self {
    State::Split(SplitState::new(branches))
  }

  pub fn split_with_timeout(branches: Vec<Flow>, timeout: Duration) -> Self {
    State::Split(SplitState::new(branches).with_timeout(timeout))
  }

  /// Ends the run `Completed`.
  pub fn end() -> Self {
    State::End(EndState::completed())
  }

  /// Ends the run `Failed`.
  pub fn fail() -> Self {
    State::End(EndState::failed())
  }

  /// Ends the run `Stopped`.
  pub fn stop() -> Self {
    State::End(EndState::stopped())
  }

  pub fn kind(&self) -> StateKind {
    match self {
      State::Step(_) => StateKind::Step,
      State::Decision(_) => StateKind::Decision,
      State::SubFlow(_) => StateKind::SubFlow,
      State::Split(_) => StateKind::Split,
      State::End(end) => match end.status() {
        FlowStatus::Completed => StateKind::End,
        FlowStatus::Failed => StateKind::Fail,
        FlowStatus::Stopped => StateKind::Stop,
      },
    }
  }

  pub fn is_terminal(&self) -> bool {
    matches!(self, State::End(_))
  }

  /// Status the run ends with when this state executes, for terminal states.
  pub fn terminal_status(&self) -> Option<FlowStatus> {
    match self {
      State::End(end) => Some(end.status()),
      _ => None,
    }
  }

  pub(crate) fn execute<'a>(
    &'a self,
    scope: StateScope<'a>,
  ) -> BoxFuture<'a, Result<ExitStatus, FlowError>> {
    match self {
      State::Step(step) => Box::pin(step.execute(scope)),
      State::Decision(decision) => Box::pin(async move { Ok(decision.execute(scope.ctx)) }),
      State::SubFlow(sub) => sub.execute(scope),
      State::Split(split) => Box::pin(split.execute(scope)),
      State::End(end) => Box::pin(async move { Ok(end.execute(scope.flow_path, scope.ctx)) }),
    }
  }
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
  if let Some(s) = panic.downcast_ref::<&str>() {
    (*s).to_string()
  } else if let Some(s) = panic.downcast_ref::<String>() {
    s.clone()
  } else {
    "unknown panic payload".to_string()
  }
}

impl From<StepState> for State {
  fn from(step: StepState) -> Self {
    State::Step(step)
  }
}

impl From<SplitState> for State {
  fn from(split: SplitState) -> Self {
    State::Split(split)
  }
}

impl From<EndState> for State {
  fn from(end: EndState) -> Self {
    State::End(end)
  }
}
