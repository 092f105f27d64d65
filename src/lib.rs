//! # streamweave-batchflow
//!
//! Flow execution engine for batch jobs.
//!
//! A [TransitionTable] holds named [State]s and ordered `(from, pattern, to)` transitions.
//! [Flow::new] validates the table and freezes it; [FlowExecutor] then drives job runs from the
//! start state to a terminal state, routing each state's [ExitStatus] through the most
//! specific matching pattern.
//!
//! ## Architecture
//!
//! - `pattern`: exact and trailing-wildcard matching with specificity ranking.
//! - `transition_table`: registration, validation, next-state resolution.
//! - `states`: step, decision, sub-flow, split and terminal states.
//! - `executor`: the run loop, restart, split phases and cooperative stop.
//!
//! Run data (contexts, records, events, results) lives in `types`; persistence goes through
//! the [JobRepository] trait.

pub mod error;
#[cfg(test)]
mod error_test;
pub mod executor;
pub mod flow;
#[cfg(test)]
mod flow_test;
pub mod options;
pub mod pattern;
#[cfg(test)]
mod pattern_test;
pub mod repository;
pub mod signal;
pub mod states;
pub mod transition_table;
pub mod types;

pub use error::{FailureKind, FlowError, StepError, ValidationError};
pub use executor::{FlowExecutor, JobRunHandle};
pub use flow::Flow;
pub use options::ExecutorOptions;
pub use repository::{InMemoryJobRepository, JobRepository};
pub use signal::{StopHandle, StopSignal};
pub use states::{
  Decider, DecisionState, EndState, SplitState, State, StateKind, StepContext, StepState,
  SubFlowState, Tasklet, tasklet_fn,
};
pub use transition_table::{Next, TransitionTable};
pub use types::{
  ExecutionContext, Exhaustion, ExitStatus, FlowPhase, FlowResult, FlowStatus, RetryPolicy,
  RunFailure, StateEvent, StepFailure, StepRecord, StepStatus,
};
