//! Step state: runs a unit of work with retry, skip and restart controls.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::{StateScope, panic_message};
use crate::error::{FlowError, StepError};
use crate::signal::StopSignal;
use crate::types::{
  Exhaustion, ExecutionContext, ExitStatus, RetryPolicy, StepFailure, StepRecord, StepStatus,
};

/// The unit of work behind a step.
///
/// An `Ok` exit status is routed as is. An `Err` becomes a `FAILED` exit status (after retries)
/// and is recorded in the context with its source chain.
#[async_trait]
pub trait Tasklet: Send + Sync {
  async fn run(&self, ctx: &mut StepContext<'_>) -> Result<ExitStatus, StepError>;
}

/// What a tasklet sees while it runs.
pub struct StepContext<'a> {
  state: &'a str,
  attempt: u32,
  ctx: &'a mut ExecutionContext,
  signal: &'a StopSignal,
}

impl<'a> StepContext<'a> {
  pub(crate) fn new(
    state: &'a str,
    attempt: u32,
    ctx: &'a mut ExecutionContext,
    signal: &'a StopSignal,
  ) -> Self {
    Self {
      state,
      attempt,
      ctx,
      signal,
    }
  }

  /// Qualified name of the running step.
  pub fn state(&self) -> &str {
    self.state
  }

  /// 1-based attempt number.
  pub fn attempt(&self) -> u32 {
    self.attempt
  }

  pub fn get(&self, key: &str) -> Option<&Value> {
    self.ctx.get(key)
  }

  pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
    self.ctx.get_as(key)
  }

  pub fn put(&mut self, key: impl Into<String>, value: impl Into<Value>) {
    self.ctx.put(key, value);
  }

  pub fn context(&self) -> &ExecutionContext {
    self.ctx
  }

  /// True once the job run was asked to stop. Long running tasklets may poll this and return
  /// early with [ExitStatus::stopped].
  pub fn is_stop_requested(&self) -> bool {
    self.signal.is_stopped()
  }
}

/// Tasklet backed by a synchronous closure. See [tasklet_fn].
pub struct TaskletFn<F>(F);

/// Wraps a closure as a [Tasklet].
pub fn tasklet_fn<F>(f: F) -> TaskletFn<F>
where
  F: Fn(&mut StepContext<'_>) -> Result<ExitStatus, StepError> + Send + Sync,
{
  TaskletFn(f)
}

#[async_trait]
impl<F> Tasklet for TaskletFn<F>
where
  F: Fn(&mut StepContext<'_>) -> Result<ExitStatus, StepError> + Send + Sync,
{
  async fn run(&self, ctx: &mut StepContext<'_>) -> Result<ExitStatus, StepError> {
    (self.0)(ctx)
  }
}

/// A step and its policies.
pub struct StepState {
  tasklet: Arc<dyn Tasklet>,
  retry: RetryPolicy,
  skip_limit: u32,
  restartable: bool,
  allow_start_if_complete: bool,
  start_limit: Option<u32>,
}

impl StepState {
  pub fn new(tasklet: impl Tasklet + 'static) -> Self {
    Self {
      tasklet: Arc::new(tasklet),
      retry: RetryPolicy::none(),
      skip_limit: 0,
      restartable: true,
      allow_start_if_complete: false,
      start_limit: None,
    }
  }

  pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
    self.retry = retry;
    self
  }

  /// Absorbs up to `limit` skippable errors per job run; each reports `COMPLETED`.
  pub fn with_skip_limit(mut self, limit: u32) -> Self {
    self.skip_limit = limit;
    self
  }

  /// A restart may not resume at this step once it has started.
  pub fn not_restartable(mut self) -> Self {
    self.restartable = false;
    self
  }

  /// Run again on restart even if it completed in an earlier attempt.
  pub fn allow_start_if_complete(mut self) -> Self {
    self.allow_start_if_complete = true;
    self
  }

  /// Maximum number of starts across the whole job run, restarts included.
  pub fn with_start_limit(mut self, limit: u32) -> Self {
    self.start_limit = Some(limit);
    self
  }

  pub fn retry(&self) -> &RetryPolicy {
    &self.retry
  }

  pub fn is_restartable(&self) -> bool {
    self.restartable
  }

  /// Checks the restart controls and marks the step started. `Some(exit)` means the step is
  /// skipped and reports `exit`.
  fn begin(&self, key: &str, ctx: &mut ExecutionContext) -> Result<Option<ExitStatus>, FlowError> {
    let generation = ctx.restart_count();
    if let Some(record) = ctx.step(key) {
      let from_earlier_attempt = record.generation < generation;
      if from_earlier_attempt && record.is_complete() && !self.allow_start_if_complete {
        info!(state = key, "step completed in an earlier attempt, skipping");
        return Ok(Some(
          record
            .exit_status
            .clone()
            .unwrap_or_else(ExitStatus::completed),
        ));
      }
      if from_earlier_attempt && !record.is_complete() && !self.restartable {
        return Err(FlowError::NonRestartableStep(key.to_string()));
      }
      if let Some(limit) = self.start_limit
        && record.start_count >= limit
      {
        return Err(FlowError::StartLimitExceeded {
          state: key.to_string(),
          limit,
        });
      }
    }

    let record = ctx.step_or_insert_with(key, || {
      StepRecord::started(self.restartable, self.allow_start_if_complete)
    });
    record.status = StepStatus::Started;
    record.exit_status = None;
    record.restartable = self.restartable;
    record.allow_start_if_complete = self.allow_start_if_complete;
    record.start_count += 1;
    record.generation = generation;
    record.started_at = chrono::Utc::now();
    record.ended_at = None;
    Ok(None)
  }

  #[instrument(level = "trace", skip_all, fields(state = scope.key))]
  pub(crate) async fn execute(&self, scope: StateScope<'_>) -> Result<ExitStatus, FlowError> {
    let StateScope { key, ctx, env, .. } = scope;
    if let Some(exit) = self.begin(key, ctx)? {
      return Ok(exit);
    }
    if env.persist_context {
      env.repository.save_context(ctx).await?;
    }

    let mut attempt = 1;
    loop {
      let outcome = {
        let mut step_ctx = StepContext::new(key, attempt, ctx, &env.signal);
        AssertUnwindSafe(self.tasklet.run(&mut step_ctx))
          .catch_unwind()
          .await
      };
      let err = match outcome {
        Ok(Ok(exit)) => {
          debug!(state = key, exit_status = %exit, attempt, "step finished");
          finish(ctx, key, exit.clone());
          return Ok(exit);
        }
        Ok(Err(err)) => err,
        Err(panic) => StepError::new(format!("step panicked: {}", panic_message(&*panic))).fatal(),
      };

      ctx.record_failure(StepFailure::from_error(key, &err, attempt));
      warn!(state = key, attempt, error = %err, "step failed");

      if err.is_skippable() && self.skip_limit > 0 {
        let skips = ctx.step_mut(key).map_or(1, |record| {
          record.skip_count += 1;
          record.skip_count
        });
        if skips > self.skip_limit {
          finish(ctx, key, ExitStatus::failed());
          return Err(FlowError::SkipLimitExceeded {
            state: key.to_string(),
            limit: self.skip_limit,
          });
        }
        info!(state = key, skips, "skippable error absorbed");
        finish(ctx, key, ExitStatus::completed());
        return Ok(ExitStatus::completed());
      }

      if err.is_retryable() && attempt < self.retry.max_attempts {
        let delay = self.retry.delay_for_retry(attempt);
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        debug!(state = key, attempt, delay_ms, "retrying step");
        tokio::time::sleep(delay).await;
        if env.signal.is_stopped() {
          info!(state = key, "stop requested between retries");
          finish(ctx, key, ExitStatus::stopped());
          return Ok(ExitStatus::stopped());
        }
        attempt += 1;
        continue;
      }

      finish(ctx, key, ExitStatus::failed());
      if self.retry.is_configured()
        && err.is_retryable()
        && self.retry.on_exhausted == Exhaustion::Abort
      {
        return Err(FlowError::RetryExhausted {
          state: key.to_string(),
          attempts: attempt,
          message: err.to_string(),
        });
      }
      return Ok(ExitStatus::failed());
    }
  }
}

fn finish(ctx: &mut ExecutionContext, key: &str, exit: ExitStatus) {
  if let Some(record) = ctx.step_mut(key) {
    record.finish(exit);
  }
}

impl fmt::Debug for StepState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("StepState")
      .field("retry", &self.retry)
      .field("skip_limit", &self.skip_limit)
      .field("restartable", &self.restartable)
      .field("allow_start_if_complete", &self.allow_start_if_complete)
      .field("start_limit", &self.start_limit)
      .finish_non_exhaustive()
  }
}
