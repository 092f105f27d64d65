//! Event handed to the persistence collaborator after every executed state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ExitStatus;

/// `(job_run_id, state, exit_status, timestamp)` for durability and restart support.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEvent {
  pub job_run_id: Uuid,
  /// Qualified state key (`sub.step` inside nested flows).
  pub state: String,
  pub exit_status: ExitStatus,
  pub timestamp: DateTime<Utc>,
}

impl StateEvent {
  pub fn now(job_run_id: Uuid, state: impl Into<String>, exit_status: ExitStatus) -> Self {
    Self {
      job_run_id,
      state: state.into(),
      exit_status,
      timestamp: Utc::now(),
    }
  }
}
