//! Flow executor: drives a job run from its start (or resume) state to a terminal state.

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::error::FlowError;
use crate::flow::Flow;
use crate::options::ExecutorOptions;
use crate::repository::{InMemoryJobRepository, JobRepository};
use crate::signal::{StopHandle, StopSignal};
use crate::states::{State, StateScope};
use crate::transition_table::Next;
use crate::types::{
  ExecutionContext, ExitStatus, FlowPhase, FlowResult, FlowStatus, RunFailure, StateEvent,
  state_key,
};

/// Publishes the phase of a job run and rejects illegal phase changes.
#[derive(Debug, Clone)]
pub(crate) struct PhaseTracker {
  tx: Arc<watch::Sender<FlowPhase>>,
}

impl PhaseTracker {
  pub(crate) fn new() -> (Self, watch::Receiver<FlowPhase>) {
    let (tx, rx) = watch::channel(FlowPhase::NotStarted);
    (Self { tx: Arc::new(tx) }, rx)
  }

  pub(crate) fn advance(&self, next: FlowPhase) {
    self.tx.send_if_modified(|phase| {
      if phase.can_transition_to(next) {
        debug!(from = ?*phase, to = ?next, "phase change");
        *phase = next;
        true
      } else {
        warn!(from = ?*phase, to = ?next, "illegal phase change ignored");
        false
      }
    });
  }
}

/// Collaborators and settings shared by every state of one run (or one split branch).
pub(crate) struct RunEnv {
  pub repository: Arc<dyn JobRepository>,
  pub options: ExecutorOptions,
  pub signal: StopSignal,
  /// Whether context snapshots are saved after each state. Off inside split branches, whose
  /// writes only become part of the run at the join.
  pub persist_context: bool,
  pub phase: Option<PhaseTracker>,
}

impl RunEnv {
  pub(crate) fn for_branch(&self, signal: StopSignal) -> RunEnv {
    RunEnv {
      repository: Arc::clone(&self.repository),
      options: self.options.clone(),
      signal,
      persist_context: false,
      phase: None,
    }
  }

  fn advance(&self, next: FlowPhase) {
    if let Some(phase) = &self.phase {
      phase.advance(next);
    }
  }
}

/// How one flow (top-level, sub-flow or split branch) ended.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FlowOutcome {
  pub status: FlowStatus,
  pub exit_status: ExitStatus,
}

impl FlowOutcome {
  fn stopped() -> Self {
    Self {
      status: FlowStatus::Stopped,
      exit_status: ExitStatus::stopped(),
    }
  }
}

/// Runs `flow` at `flow_path` until it reaches a terminal state or marker.
///
/// Entry is the pending resume target of the path if there is one, otherwise the start state.
/// The position of the flow is recorded before each non-terminal state so that an interrupted
/// run can be restarted there.
pub(crate) fn run_flow<'a>(
  flow: &'a Flow,
  flow_path: &'a str,
  ctx: &'a mut ExecutionContext,
  env: &'a RunEnv,
) -> BoxFuture<'a, Result<FlowOutcome, FlowError>> {
  Box::pin(async move {
    let mut current = match ctx.take_resume_target(flow_path) {
      Some(target) => {
        if flow.state(&target).is_none() {
          return Err(FlowError::UnknownState(state_key(flow_path, &target)));
        }
        info!(flow = flow.name(), state = %target, "resuming flow");
        target
      }
      None => flow.start().to_string(),
    };
    let mut transitions = 0u32;

    loop {
      let key = state_key(flow_path, &current);
      let state = flow
        .state(&current)
        .ok_or_else(|| FlowError::UnknownState(key.clone()))?;

      if !state.is_terminal() {
        ctx.set_position(flow_path, &current);
        if env.signal.is_stopped() {
          info!(state = %key, "stop requested, halting before state");
          return Ok(FlowOutcome::stopped());
        }
      }

      debug!(state = %key, kind = %state.kind(), "executing state");
      let is_split = matches!(state, State::Split(_));
      if is_split {
        env.advance(FlowPhase::PausedForSplit);
      }
      let executed = state
        .execute(StateScope {
          key: &key,
          flow_path,
          ctx: &mut *ctx,
          env,
        })
        .await;
      if is_split {
        env.advance(FlowPhase::Running);
      }
      let exit = executed?;

      ctx.record_visit(&key, &exit);
      env
        .repository
        .record(StateEvent::now(ctx.job_run_id(), key.as_str(), exit.clone()))
        .await?;
      if env.persist_context {
        env.repository.save_context(ctx).await?;
      }

      if let Some(status) = state.terminal_status() {
        return Ok(finish(flow, flow_path, ctx, status, exit));
      }
      if exit.is_stopped() && env.signal.is_stopped() {
        info!(state = %key, "state stopped on request");
        return Ok(FlowOutcome::stopped());
      }

      let next = flow
        .table()
        .resolve_next(&current, &exit)
        .map_err(|err| match err {
          FlowError::UnresolvedTransition { exit_status, .. } => FlowError::UnresolvedTransition {
            state: key.clone(),
            exit_status,
          },
          other => other,
        })?;
      match next {
        Next::End(status) => {
          return Ok(finish(flow, flow_path, ctx, status, status.exit_status()));
        }
        Next::State(name) => {
          transitions += 1;
          if transitions > env.options.max_transitions {
            return Err(FlowError::TransitionLimitExceeded {
              flow: flow.name().to_string(),
              limit: env.options.max_transitions,
            });
          }
          current = name.to_string();
        }
      }
    }
  })
}

fn finish(
  flow: &Flow,
  flow_path: &str,
  ctx: &mut ExecutionContext,
  status: FlowStatus,
  exit_status: ExitStatus,
) -> FlowOutcome {
  if status == FlowStatus::Completed {
    ctx.clear_position(flow_path);
  }
  debug!(flow = flow.name(), %status, %exit_status, "flow ended");
  FlowOutcome {
    status,
    exit_status,
  }
}

/// Runs flows against a repository.
///
/// Cheap to clone; clones share the repository.
#[derive(Clone)]
pub struct FlowExecutor {
  repository: Arc<dyn JobRepository>,
  options: ExecutorOptions,
}

impl std::fmt::Debug for FlowExecutor {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("FlowExecutor")
      .field("options", &self.options)
      .finish_non_exhaustive()
  }
}

impl FlowExecutor {
  pub fn new(repository: Arc<dyn JobRepository>) -> Self {
    Self {
      repository,
      options: ExecutorOptions::default(),
    }
  }

  /// Executor backed by a fresh [InMemoryJobRepository].
  pub fn in_memory() -> Self {
    Self::new(Arc::new(InMemoryJobRepository::new()))
  }

  pub fn with_options(mut self, options: ExecutorOptions) -> Self {
    self.options = options;
    self
  }

  pub fn options(&self) -> &ExecutorOptions {
    &self.options
  }

  pub fn repository(&self) -> &Arc<dyn JobRepository> {
    &self.repository
  }

  /// Runs `flow` from its start state on a fresh context.
  pub async fn run(&self, flow: &Flow, ctx: ExecutionContext) -> FlowResult {
    let (_, signal) = StopSignal::new();
    let (phase, _) = PhaseTracker::new();
    self.drive(flow, ctx, signal, phase).await
  }

  /// Continues a job run from a context returned by an earlier run.
  ///
  /// The run resumes at the recorded position (or the restart target of the stop state it
  /// ended in). A context of a run that already completed is refused.
  pub async fn resume(&self, flow: &Flow, ctx: ExecutionContext) -> FlowResult {
    let (_, signal) = StopSignal::new();
    let (phase, _) = PhaseTracker::new();
    self.drive_resume(flow, ctx, signal, phase).await
  }

  /// Loads the last saved context of `job_run_id` and [resumes](Self::resume) it.
  pub async fn restart(&self, flow: &Flow, job_run_id: Uuid) -> Result<FlowResult, FlowError> {
    let ctx = self
      .repository
      .load_context(job_run_id)
      .await?
      .ok_or_else(|| FlowError::Repository(format!("no saved context for job run {job_run_id}")))?;
    Ok(self.resume(flow, ctx).await)
  }

  /// Runs `flow` on a tokio task. The handle can stop the run and observe its phase.
  pub fn spawn(&self, flow: &Flow, ctx: ExecutionContext) -> JobRunHandle {
    self.spawn_with(flow, ctx, false)
  }

  /// Like [spawn](Self::spawn), but [resumes](Self::resume) the given context.
  pub fn spawn_resume(&self, flow: &Flow, ctx: ExecutionContext) -> JobRunHandle {
    self.spawn_with(flow, ctx, true)
  }

  fn spawn_with(&self, flow: &Flow, ctx: ExecutionContext, resume: bool) -> JobRunHandle {
    let (stop, signal) = StopSignal::new();
    let (phase, phase_rx) = PhaseTracker::new();
    let job_run_id = ctx.job_run_id();
    let executor = self.clone();
    let flow = flow.clone();
    let task = tokio::spawn(async move {
      if resume {
        executor.drive_resume(&flow, ctx, signal, phase).await
      } else {
        executor.drive(&flow, ctx, signal, phase).await
      }
    });
    JobRunHandle {
      job_run_id,
      stop,
      phase: phase_rx,
      task,
    }
  }

  async fn drive_resume(
    &self,
    flow: &Flow,
    mut ctx: ExecutionContext,
    signal: StopSignal,
    phase: PhaseTracker,
  ) -> FlowResult {
    if ctx.status() == Some(FlowStatus::Completed) {
      let err = FlowError::AlreadyCompleted(ctx.job_run_id().to_string());
      warn!(job_run_id = %ctx.job_run_id(), "refusing to restart a completed job run");
      phase.advance(FlowPhase::Failed);
      let failures = ctx.failures().to_vec();
      return FlowResult {
        job_run_id: ctx.job_run_id(),
        status: FlowStatus::Failed,
        exit_status: ExitStatus::failed(),
        context: ctx,
        failure: Some(RunFailure::fatal(err, failures)),
      };
    }
    ctx.begin_restart();
    info!(
      job_run_id = %ctx.job_run_id(),
      restart = ctx.restart_count(),
      "restarting job run"
    );
    self.drive(flow, ctx, signal, phase).await
  }

  #[instrument(level = "trace", skip_all, fields(flow = flow.name(), job_run_id = %ctx.job_run_id()))]
  async fn drive(
    &self,
    flow: &Flow,
    mut ctx: ExecutionContext,
    signal: StopSignal,
    phase: PhaseTracker,
  ) -> FlowResult {
    let job_run_id = ctx.job_run_id();
    info!(%job_run_id, flow = flow.name(), "job run started");
    phase.advance(FlowPhase::Running);
    let env = RunEnv {
      repository: Arc::clone(&self.repository),
      options: self.options.clone(),
      signal,
      persist_context: true,
      phase: Some(phase.clone()),
    };

    let (mut status, exit_status, mut error) = match run_flow(flow, "", &mut ctx, &env).await {
      Ok(outcome) => (outcome.status, outcome.exit_status, None),
      Err(err) => {
        error!(%job_run_id, error = %err, "job run aborted");
        (FlowStatus::Failed, ExitStatus::failed(), Some(err))
      }
    };
    ctx.set_status(status);
    if let Err(err) = self.repository.save_context(&ctx).await {
      error!(%job_run_id, error = %err, "failed to save final context");
      if error.is_none() {
        status = FlowStatus::Failed;
        ctx.set_status(status);
        error = Some(err);
      }
    }
    phase.advance(status.into());
    info!(%job_run_id, %status, %exit_status, "job run finished");

    let failure = match (status, error) {
      (_, Some(err)) => Some(RunFailure::fatal(err, ctx.failures().to_vec())),
      (FlowStatus::Failed, None) => Some(RunFailure::routed(ctx.failures().to_vec())),
      _ => None,
    };
    FlowResult {
      job_run_id,
      status,
      exit_status,
      context: ctx,
      failure,
    }
  }
}

/// A job run executing on a tokio task.
#[derive(Debug)]
pub struct JobRunHandle {
  job_run_id: Uuid,
  stop: StopHandle,
  phase: watch::Receiver<FlowPhase>,
  task: JoinHandle<FlowResult>,
}

impl JobRunHandle {
  pub fn job_run_id(&self) -> Uuid {
    self.job_run_id
  }

  /// Asks the run to stop at the next state boundary. The run ends `Stopped` and can be
  /// restarted at the state it was about to execute.
  pub fn stop(&self) {
    info!(job_run_id = %self.job_run_id, "stop requested");
    self.stop.stop();
  }

  /// Receiver of the run's phase changes.
  pub fn phase(&self) -> watch::Receiver<FlowPhase> {
    self.phase.clone()
  }

  pub async fn wait(self) -> Result<FlowResult, JoinError> {
    self.task.await
  }
}
