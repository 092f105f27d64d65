//! Persistence collaborator: receives state events and keeps contexts for restart.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::FlowError;
use crate::types::{ExecutionContext, StateEvent};

/// Storage for job run events and contexts.
///
/// The engine calls [record](JobRepository::record) after every executed state and
/// [save_context](JobRepository::save_context) after every state of the top-level run.
#[async_trait]
pub trait JobRepository: Send + Sync {
  async fn record(&self, event: StateEvent) -> Result<(), FlowError>;

  async fn save_context(&self, context: &ExecutionContext) -> Result<(), FlowError>;

  /// Last saved context of a job run, if any.
  async fn load_context(&self, job_run_id: Uuid) -> Result<Option<ExecutionContext>, FlowError>;
}

/// Repository kept in memory. Suitable for tests and for embedding without durability.
#[derive(Debug, Default)]
pub struct InMemoryJobRepository {
  events: RwLock<Vec<StateEvent>>,
  contexts: RwLock<HashMap<Uuid, ExecutionContext>>,
}

impl InMemoryJobRepository {
  pub fn new() -> Self {
    Self::default()
  }

  /// Events of one job run in recording order.
  pub async fn events_for(&self, job_run_id: Uuid) -> Vec<StateEvent> {
    self
      .events
      .read()
      .await
      .iter()
      .filter(|e| e.job_run_id == job_run_id)
      .cloned()
      .collect()
  }

  pub async fn event_count(&self) -> usize {
    self.events.read().await.len()
  }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
  async fn record(&self, event: StateEvent) -> Result<(), FlowError> {
    self.events.write().await.push(event);
    Ok(())
  }

  async fn save_context(&self, context: &ExecutionContext) -> Result<(), FlowError> {
    self
      .contexts
      .write()
      .await
      .insert(context.job_run_id(), context.clone());
    Ok(())
  }

  async fn load_context(&self, job_run_id: Uuid) -> Result<Option<ExecutionContext>, FlowError> {
    Ok(self.contexts.read().await.get(&job_run_id).cloned())
  }
}
