//! Split state: runs branch flows concurrently and joins them.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{info, instrument, warn};

use super::{StateScope, panic_message};
use crate::error::{FlowError, StepError};
use crate::executor::{FlowOutcome, run_flow};
use crate::flow::Flow;
use crate::types::{ExecutionContext, ExitStatus, FlowStatus, StepFailure, state_key};

type BranchResult = (usize, Result<FlowOutcome, FlowError>, ExecutionContext);

/// Runs every branch on its own copy of the context, each as a tokio task.
///
/// At the join the branch writes are merged back in declaration order and the exit status is
/// aggregated: `FAILED` if any branch failed, `STOPPED` if the run was asked to stop and a
/// branch halted, the common exit status if all branches agree, `COMPLETED` otherwise.
#[derive(Debug, Clone)]
pub struct SplitState {
  branches: Vec<Flow>,
  timeout: Option<Duration>,
}

impl SplitState {
  pub fn new(branches: Vec<Flow>) -> Self {
    Self {
      branches,
      timeout: None,
    }
  }

  /// After `timeout` the branches are asked to stop, their writes are discarded and the split
  /// reports `FAILED`.
  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = Some(timeout);
    self
  }

  pub fn branches(&self) -> &[Flow] {
    &self.branches
  }

  pub fn timeout(&self) -> Option<Duration> {
    self.timeout
  }

  #[instrument(level = "trace", skip_all, fields(state = scope.key))]
  pub(crate) async fn execute(&self, scope: StateScope<'_>) -> Result<ExitStatus, FlowError> {
    let StateScope { key, ctx, env, .. } = scope;
    let (stop_branches, branch_signal) = env.signal.child();
    info!(state = key, branches = self.branches.len(), "split started");

    let mut tasks = JoinSet::new();
    for (idx, branch) in self.branches.iter().enumerate() {
      let flow = branch.clone();
      let path = state_key(key, branch.name());
      let mut fork = ctx.fork();
      let branch_env = env.for_branch(branch_signal.clone());
      let split = key.to_string();
      tasks.spawn(async move {
        let result = AssertUnwindSafe(run_flow(&flow, &path, &mut fork, &branch_env))
          .catch_unwind()
          .await
          .unwrap_or_else(|panic| {
            Err(FlowError::SplitBranch {
              state: split,
              branch: flow.name().to_string(),
              message: panic_message(&*panic),
            })
          });
        (idx, result, fork)
      });
    }

    let deadline = self
      .timeout
      .or_else(|| env.options.split_timeout())
      .map(|timeout| (timeout, Instant::now() + timeout));
    let mut timed_out = false;
    let mut joined: Vec<BranchResult> = Vec::with_capacity(self.branches.len());
    loop {
      let next = match deadline {
        Some((timeout, at)) if !timed_out => {
          match tokio::time::timeout_at(at, tasks.join_next()).await {
            Ok(next) => next,
            Err(_) => {
              warn!(
                state = key,
                timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                "split timed out"
              );
              timed_out = true;
              stop_branches.stop();
              continue;
            }
          }
        }
        _ => tasks.join_next().await,
      };
      let Some(next) = next else {
        break;
      };
      match next {
        Ok(branch) => {
          if branch.1.is_err() {
            stop_branches.stop();
          }
          joined.push(branch);
        }
        Err(join_error) => {
          stop_branches.stop();
          return Err(FlowError::SplitBranch {
            state: key.to_string(),
            branch: String::from("<unknown>"),
            message: join_error.to_string(),
          });
        }
      }
    }

    if timed_out {
      let error = StepError::new(format!("split '{key}' timed out, branch writes discarded"));
      ctx.record_failure(StepFailure::from_error(key, &error, 1));
      for branch in &self.branches {
        ctx.clear_position(&state_key(key, branch.name()));
      }
      return Ok(ExitStatus::failed());
    }

    joined.sort_by_key(|(idx, _, _)| *idx);
    let mut first_error = None;
    let mut exits = Vec::with_capacity(joined.len());
    let mut any_failed = false;
    let mut any_stopped = false;
    for (idx, result, fork) in joined {
      match result {
        Ok(outcome) => {
          info!(
            state = key,
            branch = self.branches[idx].name(),
            status = %outcome.status,
            exit_status = %outcome.exit_status,
            "branch finished"
          );
          any_failed |= outcome.status == FlowStatus::Failed || outcome.exit_status.is_failed();
          any_stopped |= outcome.status == FlowStatus::Stopped;
          exits.push(outcome.exit_status);
          ctx.merge(fork);
        }
        Err(err) => {
          warn!(state = key, branch = self.branches[idx].name(), error = %err, "branch aborted");
          first_error.get_or_insert(err);
        }
      }
    }
    if let Some(err) = first_error {
      return Err(err);
    }

    if !any_failed && any_stopped && env.signal.is_stopped() {
      info!(state = key, "split halted on stop request");
      return Ok(ExitStatus::stopped());
    }
    Ok(aggregate(any_failed, exits))
  }
}

fn aggregate(any_failed: bool, exits: Vec<ExitStatus>) -> ExitStatus {
  if any_failed {
    return ExitStatus::failed();
  }
  let mut exits = exits.into_iter();
  match exits.next() {
    Some(first) if exits.all(|e| e == first) => first,
    _ => ExitStatus::completed(),
  }
}
