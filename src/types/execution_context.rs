//! Mutable state of one job run: attributes, step records, visit history and positions.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;
use uuid::Uuid;

use super::{ExitStatus, FlowStatus, StateVisit, StepFailure, StepRecord};

/// Attributes carried between states.
pub type Attributes = HashMap<String, Value>;

/// Builds the context key of a state inside the flow at `flow_path`.
///
/// The top-level flow has an empty path, so its states are keyed by their bare names.
pub fn state_key(flow_path: &str, state: &str) -> String {
  if flow_path.is_empty() {
    state.to_string()
  } else {
    format!("{flow_path}.{state}")
  }
}

/// Bookkeeping for a branch copy, used to merge only the branch's own writes.
#[derive(Debug, Clone, Default)]
struct ForkBase {
  history_len: usize,
  failures_len: usize,
  positions: HashMap<String, String>,
  resume_targets: HashMap<String, String>,
  written: HashSet<String>,
}

/// Execution context of one job run.
///
/// Exclusively owned by one run (or one split branch while the branch runs). Branches work
/// on a [fork](ExecutionContext::fork) and are folded back with
/// [merge](ExecutionContext::merge) at the join barrier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
  job_run_id: Uuid,
  attributes: Attributes,
  steps: HashMap<String, StepRecord>,
  history: Vec<StateVisit>,
  /// Current state per flow path; cleared when the flow at that path terminates.
  positions: HashMap<String, String>,
  /// Where each flow path continues on its next entry: set by a stop state with a restart
  /// target, or from the recorded positions when a run is restarted. Consumed on entry.
  resume_targets: HashMap<String, String>,
  failures: Vec<StepFailure>,
  status: Option<FlowStatus>,
  #[serde(default)]
  restart_count: u32,
  #[serde(skip)]
  fork: Option<ForkBase>,
}

impl Default for ExecutionContext {
  fn default() -> Self {
    Self::new()
  }
}

impl ExecutionContext {
  pub fn new() -> Self {
    Self::with_attributes(Attributes::new())
  }

  /// Fresh context seeded with job parameters or other shared data.
  pub fn with_attributes(attributes: Attributes) -> Self {
    Self {
      job_run_id: Uuid::new_v4(),
      attributes,
      steps: HashMap::new(),
      history: Vec::new(),
      positions: HashMap::new(),
      resume_targets: HashMap::new(),
      failures: Vec::new(),
      status: None,
      restart_count: 0,
      fork: None,
    }
  }

  pub fn job_run_id(&self) -> Uuid {
    self.job_run_id
  }

  pub fn get(&self, key: &str) -> Option<&Value> {
    self.attributes.get(key)
  }

  /// Reads an attribute and deserializes it; `None` if missing or of another shape.
  pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
    self
      .attributes
      .get(key)
      .and_then(|v| serde_json::from_value(v.clone()).ok())
  }

  pub fn put(&mut self, key: impl Into<String>, value: impl Into<Value>) {
    let key = key.into();
    if let Some(fork) = self.fork.as_mut() {
      fork.written.insert(key.clone());
    }
    self.attributes.insert(key, value.into());
  }

  pub fn attributes(&self) -> &Attributes {
    &self.attributes
  }

  pub fn step(&self, key: &str) -> Option<&StepRecord> {
    self.steps.get(key)
  }

  pub fn step_mut(&mut self, key: &str) -> Option<&mut StepRecord> {
    self.steps.get_mut(key)
  }

  pub fn steps(&self) -> &HashMap<String, StepRecord> {
    &self.steps
  }

  pub fn step_or_insert_with(
    &mut self,
    key: &str,
    default: impl FnOnce() -> StepRecord,
  ) -> &mut StepRecord {
    self.steps.entry(key.to_string()).or_insert_with(default)
  }

  pub fn insert_step(&mut self, key: impl Into<String>, record: StepRecord) {
    self.steps.insert(key.into(), record);
  }

  /// Appends `(state, exit_status)` to the visit history.
  #[instrument(level = "trace", skip(self))]
  pub fn record_visit(&mut self, key: &str, exit_status: &ExitStatus) {
    self.history.push(StateVisit {
      state: key.to_string(),
      exit_status: exit_status.clone(),
      at: Utc::now(),
    });
  }

  pub fn history(&self) -> &[StateVisit] {
    &self.history
  }

  /// Exit status of the most recent visit with the given key.
  pub fn exit_status_of(&self, key: &str) -> Option<&ExitStatus> {
    self
      .history
      .iter()
      .rev()
      .find(|v| v.state == key)
      .map(|v| &v.exit_status)
  }

  pub fn last_exit_status(&self) -> Option<&ExitStatus> {
    self.history.last().map(|v| &v.exit_status)
  }

  pub fn record_failure(&mut self, failure: StepFailure) {
    self.failures.push(failure);
  }

  pub fn failures(&self) -> &[StepFailure] {
    &self.failures
  }

  pub fn position(&self, flow_path: &str) -> Option<&str> {
    self.positions.get(flow_path).map(String::as_str)
  }

  pub fn set_position(&mut self, flow_path: &str, state: &str) {
    self
      .positions
      .insert(flow_path.to_string(), state.to_string());
  }

  /// Forgets the position and pending resume target of the flow at `flow_path` and of every
  /// flow nested below it.
  pub fn clear_position(&mut self, flow_path: &str) {
    if flow_path.is_empty() {
      self.positions.clear();
      self.resume_targets.clear();
      return;
    }
    let nested = format!("{flow_path}.");
    let keep = |path: &String| path != flow_path && !path.starts_with(&nested);
    self.positions.retain(|path, _| keep(path));
    self.resume_targets.retain(|path, _| keep(path));
  }

  pub fn set_resume_target(&mut self, flow_path: &str, state: &str) {
    self
      .resume_targets
      .insert(flow_path.to_string(), state.to_string());
  }

  pub fn take_resume_target(&mut self, flow_path: &str) -> Option<String> {
    self.resume_targets.remove(flow_path)
  }

  pub fn status(&self) -> Option<FlowStatus> {
    self.status
  }

  pub fn set_status(&mut self, status: FlowStatus) {
    self.status = Some(status);
  }

  /// True while executing a run that was resumed from a previous context.
  pub fn is_restart(&self) -> bool {
    self.restart_count > 0
  }

  pub fn restart_count(&self) -> u32 {
    self.restart_count
  }

  /// Prepares a persisted context for another attempt of the same job run.
  ///
  /// Every recorded position becomes the resume target of its flow unless a stop state
  /// already set one.
  pub(crate) fn begin_restart(&mut self) {
    self.restart_count += 1;
    self.status = None;
    for (path, state) in self.positions.drain() {
      self.resume_targets.entry(path).or_insert(state);
    }
  }

  /// Copy handed to a split branch: reads see the parent, writes are tracked for the merge.
  pub fn fork(&self) -> Self {
    let mut branch = self.clone();
    branch.fork = Some(ForkBase {
      history_len: self.history.len(),
      failures_len: self.failures.len(),
      positions: self.positions.clone(),
      resume_targets: self.resume_targets.clone(),
      written: HashSet::new(),
    });
    branch
  }

  /// Folds a branch's writes back into this context.
  ///
  /// Taken over: attributes the branch wrote, records of steps it visited, positions and
  /// resume targets it changed, and history and failures appended after the fork.
  #[instrument(level = "trace", skip_all)]
  pub fn merge(&mut self, branch: ExecutionContext) {
    let ExecutionContext {
      mut attributes,
      mut steps,
      history,
      positions,
      resume_targets,
      failures,
      fork,
      ..
    } = branch;
    let base = fork.unwrap_or_default();

    for key in base.written {
      if let Some(value) = attributes.remove(&key) {
        self.put(key, value);
      }
    }
    let appended = history.into_iter().skip(base.history_len);
    for visit in appended {
      if let Some(record) = steps.remove(&visit.state) {
        self.steps.insert(visit.state.clone(), record);
      }
      self.history.push(visit);
    }
    self
      .failures
      .extend(failures.into_iter().skip(base.failures_len));
    merge_changes(&mut self.positions, &base.positions, positions);
    merge_changes(&mut self.resume_targets, &base.resume_targets, resume_targets);
  }
}

/// Applies to `target` the entries `branch` removed or changed relative to `base`.
fn merge_changes(
  target: &mut HashMap<String, String>,
  base: &HashMap<String, String>,
  branch: HashMap<String, String>,
) {
  for path in base.keys() {
    if !branch.contains_key(path) {
      target.remove(path);
    }
  }
  for (path, state) in branch {
    if base.get(&path) != Some(&state) {
      target.insert(path, state);
    }
  }
}
