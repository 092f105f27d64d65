//! Run data of the flow engine: exit statuses, contexts, records, events and results.

mod execution_context;
mod exit_status;
mod flow_result;
mod flow_status;
mod retry_policy;
mod state_event;
mod step_record;
#[cfg(test)]
mod step_record_test;
mod transition;

pub use execution_context::{Attributes, ExecutionContext, state_key};
pub use exit_status::ExitStatus;
pub use flow_result::{FlowResult, RunFailure};
pub use flow_status::{FlowPhase, FlowStatus};
pub use retry_policy::{Exhaustion, RetryPolicy};
pub use state_event::StateEvent;
pub use step_record::{StateVisit, StepFailure, StepRecord, StepStatus};
pub use transition::Transition;
