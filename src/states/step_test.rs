//! Tests for `StepState`.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use super::{StateScope, StepContext, StepState, Tasklet, tasklet_fn};
use crate::error::{FlowError, StepError};
use crate::executor::RunEnv;
use crate::options::ExecutorOptions;
use crate::repository::{InMemoryJobRepository, JobRepository};
use crate::signal::StopSignal;
use crate::types::{Exhaustion, ExecutionContext, ExitStatus, RetryPolicy, StepStatus};

fn env_with(signal: StopSignal) -> RunEnv {
  RunEnv {
    repository: Arc::new(InMemoryJobRepository::new()),
    options: ExecutorOptions::default(),
    signal,
    persist_context: false,
    phase: None,
  }
}

fn env() -> RunEnv {
  env_with(StopSignal::never())
}

async fn run(
  step: &StepState,
  ctx: &mut ExecutionContext,
  env: &RunEnv,
) -> Result<ExitStatus, FlowError> {
  step
    .execute(StateScope {
      key: "load",
      flow_path: "",
      ctx,
      env,
    })
    .await
}

/// Tasklet failing with a retryable error until `succeed_on`, counting invocations.
fn flaky(calls: Arc<AtomicU32>, succeed_on: u32) -> StepState {
  StepState::new(tasklet_fn(move |_| {
    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
    if n >= succeed_on {
      Ok(ExitStatus::completed())
    } else {
      Err(StepError::new(format!("attempt {n} failed")))
    }
  }))
}

#[tokio::test]
async fn successful_step_records_completion() {
  let step = StepState::new(tasklet_fn(|ctx| {
    ctx.put("rows", 42);
    Ok(ExitStatus::new("LOADED"))
  }));
  let mut ctx = ExecutionContext::new();
  let exit = run(&step, &mut ctx, &env()).await.unwrap();
  assert_eq!(exit.code(), "LOADED");
  assert_eq!(ctx.get_as::<u32>("rows"), Some(42));
  let record = ctx.step("load").unwrap();
  assert_eq!(record.status, StepStatus::Completed);
  assert_eq!(record.start_count, 1);
  assert!(record.ended_at.is_some());
}

#[tokio::test]
async fn error_becomes_failed_with_cause_chain() {
  let step = StepState::new(tasklet_fn(|_| {
    Err(StepError::caused_by(
      "cannot read input",
      io::Error::new(io::ErrorKind::NotFound, "input.csv missing"),
    ))
  }));
  let mut ctx = ExecutionContext::new();
  let exit = run(&step, &mut ctx, &env()).await.unwrap();
  assert!(exit.is_failed());
  assert_eq!(ctx.step("load").unwrap().status, StepStatus::Failed);
  let failure = &ctx.failures()[0];
  assert_eq!(failure.state, "load");
  assert_eq!(failure.message, "cannot read input");
  assert!(failure.mentions("input.csv missing"));
}

#[tokio::test]
async fn panic_becomes_failed() {
  let step = StepState::new(tasklet_fn(|_| panic!("boom")));
  let mut ctx = ExecutionContext::new();
  let exit = run(&step, &mut ctx, &env()).await.unwrap();
  assert!(exit.is_failed());
  assert!(ctx.failures()[0].mentions("boom"));
}

#[tokio::test]
async fn retries_until_success() {
  let calls = Arc::new(AtomicU32::new(0));
  let step = flaky(calls.clone(), 3).with_retry(RetryPolicy::exponential(3, 1));
  let mut ctx = ExecutionContext::new();
  let exit = run(&step, &mut ctx, &env()).await.unwrap();
  assert_eq!(exit, ExitStatus::completed());
  assert_eq!(calls.load(Ordering::SeqCst), 3);
  assert_eq!(ctx.failures().len(), 2);
  assert_eq!(ctx.failures()[1].attempt, 2);
}

#[tokio::test]
async fn exhausted_retries_abort_the_run() {
  let calls = Arc::new(AtomicU32::new(0));
  let step = flaky(calls.clone(), 10).with_retry(RetryPolicy::exponential(2, 1));
  let mut ctx = ExecutionContext::new();
  let err = run(&step, &mut ctx, &env()).await.unwrap_err();
  assert_eq!(
    err,
    FlowError::RetryExhausted {
      state: "load".into(),
      attempts: 2,
      message: "attempt 2 failed".into(),
    }
  );
  assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn exhausted_retries_can_report_failed() {
  let calls = Arc::new(AtomicU32::new(0));
  let step = flaky(calls, 10)
    .with_retry(RetryPolicy::exponential(2, 1).on_exhausted(Exhaustion::Fail));
  let mut ctx = ExecutionContext::new();
  assert!(run(&step, &mut ctx, &env()).await.unwrap().is_failed());
}

#[tokio::test]
async fn fatal_error_is_not_retried() {
  let calls = Arc::new(AtomicU32::new(0));
  let counter = calls.clone();
  let step = StepState::new(tasklet_fn(move |_| {
    counter.fetch_add(1, Ordering::SeqCst);
    Err(StepError::new("bad record").fatal())
  }))
  .with_retry(RetryPolicy::exponential(5, 1));
  let mut ctx = ExecutionContext::new();
  assert!(run(&step, &mut ctx, &env()).await.unwrap().is_failed());
  assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn skippable_errors_are_absorbed_up_to_the_limit() {
  let step = StepState::new(tasklet_fn(|_| Err(StepError::new("bad row").skippable())))
    .with_skip_limit(1);
  let mut ctx = ExecutionContext::new();
  let env = env();
  assert_eq!(
    run(&step, &mut ctx, &env).await.unwrap(),
    ExitStatus::completed()
  );
  assert_eq!(ctx.step("load").unwrap().skip_count, 1);
  let err = run(&step, &mut ctx, &env).await.unwrap_err();
  assert_eq!(
    err,
    FlowError::SkipLimitExceeded {
      state: "load".into(),
      limit: 1
    }
  );
}

#[tokio::test]
async fn completed_step_is_skipped_on_restart() {
  let calls = Arc::new(AtomicU32::new(0));
  let step = flaky(calls.clone(), 1);
  let mut ctx = ExecutionContext::new();
  let env = env();
  run(&step, &mut ctx, &env).await.unwrap();
  ctx.begin_restart();
  let exit = run(&step, &mut ctx, &env).await.unwrap();
  assert_eq!(exit, ExitStatus::completed());
  assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn allow_start_if_complete_runs_again_on_restart() {
  let calls = Arc::new(AtomicU32::new(0));
  let step = flaky(calls.clone(), 1).allow_start_if_complete();
  let mut ctx = ExecutionContext::new();
  let env = env();
  run(&step, &mut ctx, &env).await.unwrap();
  ctx.begin_restart();
  run(&step, &mut ctx, &env).await.unwrap();
  assert_eq!(calls.load(Ordering::SeqCst), 2);
  assert_eq!(ctx.step("load").unwrap().start_count, 2);
}

#[tokio::test]
async fn completed_step_runs_again_within_the_same_attempt() {
  let calls = Arc::new(AtomicU32::new(0));
  let step = flaky(calls.clone(), 1);
  let mut ctx = ExecutionContext::new();
  let env = env();
  run(&step, &mut ctx, &env).await.unwrap();
  run(&step, &mut ctx, &env).await.unwrap();
  assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn failed_non_restartable_step_refuses_restart() {
  let step = StepState::new(tasklet_fn(|_| Err(StepError::new("down")))).not_restartable();
  let mut ctx = ExecutionContext::new();
  let env = env();
  assert!(run(&step, &mut ctx, &env).await.unwrap().is_failed());
  ctx.begin_restart();
  let err = run(&step, &mut ctx, &env).await.unwrap_err();
  assert_eq!(err, FlowError::NonRestartableStep("load".into()));
}

#[tokio::test]
async fn start_limit_is_enforced() {
  let step = StepState::new(tasklet_fn(|_| Ok(ExitStatus::completed()))).with_start_limit(2);
  let mut ctx = ExecutionContext::new();
  let env = env();
  run(&step, &mut ctx, &env).await.unwrap();
  run(&step, &mut ctx, &env).await.unwrap();
  let err = run(&step, &mut ctx, &env).await.unwrap_err();
  assert_eq!(
    err,
    FlowError::StartLimitExceeded {
      state: "load".into(),
      limit: 2
    }
  );
}

#[tokio::test]
async fn stop_between_retries_reports_stopped() {
  let (handle, signal) = StopSignal::new();
  let step = StepState::new(tasklet_fn(move |_| {
    handle.stop();
    Err(StepError::new("transient"))
  }))
  .with_retry(RetryPolicy::exponential(5, 1));
  let mut ctx = ExecutionContext::new();
  let exit = run(&step, &mut ctx, &env_with(signal)).await.unwrap();
  assert!(exit.is_stopped());
  assert_eq!(ctx.step("load").unwrap().status, StepStatus::Stopped);
}

#[tokio::test]
async fn tasklet_sees_attempt_and_stop_flag() {
  let step = StepState::new(tasklet_fn(|ctx| {
    assert_eq!(ctx.state(), "load");
    assert_eq!(ctx.attempt(), 1);
    assert!(!ctx.is_stop_requested());
    Ok(ExitStatus::completed())
  }));
  let mut ctx = ExecutionContext::new();
  run(&step, &mut ctx, &env()).await.unwrap();
}

/// Reads the saved context while running, as a crashed process would leave it.
struct InspectSaved(Arc<InMemoryJobRepository>);

#[async_trait]
impl Tasklet for InspectSaved {
  async fn run(&self, ctx: &mut StepContext<'_>) -> Result<ExitStatus, StepError> {
    let saved = self
      .0
      .load_context(ctx.context().job_run_id())
      .await
      .map_err(|e| StepError::new(e.to_string()))?
      .ok_or_else(|| StepError::new("nothing saved"))?;
    match saved.step("load") {
      Some(record) if record.status == StepStatus::Started => Ok(ExitStatus::completed()),
      other => Err(StepError::new(format!("unexpected saved record: {other:?}")).fatal()),
    }
  }
}

#[tokio::test]
async fn started_record_is_saved_before_the_tasklet_runs() {
  let repository = Arc::new(InMemoryJobRepository::new());
  let env = RunEnv {
    repository: repository.clone(),
    options: ExecutorOptions::default(),
    signal: StopSignal::never(),
    persist_context: true,
    phase: None,
  };
  let step = StepState::new(InspectSaved(repository.clone()));
  let mut ctx = ExecutionContext::new();
  let exit = run(&step, &mut ctx, &env).await.unwrap();
  assert_eq!(exit, ExitStatus::completed());
  assert!(ctx.failures().is_empty());
}
