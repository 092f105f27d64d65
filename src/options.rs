//! Engine configuration.

use std::env;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

/// Environment variable overriding [ExecutorOptions::max_transitions].
pub const MAX_TRANSITIONS_ENV: &str = "BATCHFLOW_MAX_TRANSITIONS";
/// Environment variable overriding [ExecutorOptions::split_timeout_ms].
pub const SPLIT_TIMEOUT_ENV: &str = "BATCHFLOW_SPLIT_TIMEOUT_MS";

/// Options for [FlowExecutor](crate::FlowExecutor).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExecutorOptions {
  /// Upper bound on transitions taken by one flow in one attempt; guards against
  /// configurations that loop forever.
  pub max_transitions: u32,
  /// Default split timeout in milliseconds; `None` waits for every branch.
  pub split_timeout_ms: Option<u64>,
}

impl Default for ExecutorOptions {
  fn default() -> Self {
    Self {
      max_transitions: 1000,
      split_timeout_ms: None,
    }
  }
}

impl ExecutorOptions {
  /// Defaults overridden by `BATCHFLOW_*` environment variables. Unparseable values are
  /// ignored with a warning.
  pub fn from_env() -> Self {
    let mut options = Self::default();
    if let Ok(raw) = env::var(MAX_TRANSITIONS_ENV) {
      match raw.parse() {
        Ok(v) => options.max_transitions = v,
        Err(_) => warn!(var = MAX_TRANSITIONS_ENV, value = %raw, "ignoring invalid value"),
      }
    }
    if let Ok(raw) = env::var(SPLIT_TIMEOUT_ENV) {
      match raw.parse() {
        Ok(v) => options.split_timeout_ms = Some(v),
        Err(_) => warn!(var = SPLIT_TIMEOUT_ENV, value = %raw, "ignoring invalid value"),
      }
    }
    options
  }

  pub fn with_max_transitions(mut self, max_transitions: u32) -> Self {
    self.max_transitions = max_transitions;
    self
  }

  pub fn with_split_timeout(mut self, timeout: Duration) -> Self {
    self.split_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
    self
  }

  pub fn split_timeout(&self) -> Option<Duration> {
    self.split_timeout_ms.map(Duration::from_millis)
  }
}
