//! Retry behaviour of a step delegate.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What a step does once its retry budget is spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Exhaustion {
  /// Report `FAILED` and let the configured transitions route it.
  Fail,
  /// Abort the whole job run.
  Abort,
}

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
  /// Total attempts, including the first one. `1` disables retries.
  pub max_attempts: u32,
  /// Delay before the first retry, in milliseconds.
  pub base_delay_ms: u64,
  /// Factor applied to the delay after each retry.
  pub multiplier: u32,
  /// Upper bound for any single delay, in milliseconds.
  pub max_delay_ms: u64,
  pub on_exhausted: Exhaustion,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self::none()
  }
}

impl RetryPolicy {
  /// Single attempt; a failure is reported as `FAILED`.
  pub fn none() -> Self {
    Self {
      max_attempts: 1,
      base_delay_ms: 0,
      multiplier: 1,
      max_delay_ms: 0,
      on_exhausted: Exhaustion::Fail,
    }
  }

  /// `max_attempts` attempts with delays `base, base*2, base*4, ...` capped at 30s.
  /// Exhausting the attempts aborts the run.
  pub fn exponential(max_attempts: u32, base_delay_ms: u64) -> Self {
    Self {
      max_attempts: max_attempts.max(1),
      base_delay_ms,
      multiplier: 2,
      max_delay_ms: 30_000,
      on_exhausted: Exhaustion::Abort,
    }
  }

  pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
    self.max_delay_ms = max_delay_ms;
    self
  }

  pub fn on_exhausted(mut self, on_exhausted: Exhaustion) -> Self {
    self.on_exhausted = on_exhausted;
    self
  }

  /// True when more than one attempt is allowed.
  pub fn is_configured(&self) -> bool {
    self.max_attempts > 1
  }

  /// Delay before retry number `retry` (1-based): `base * multiplier^(retry - 1)`, capped.
  pub fn delay_for_retry(&self, retry: u32) -> Duration {
    let factor = u64::from(self.multiplier.max(1)).saturating_pow(retry.saturating_sub(1));
    let delay = self
      .base_delay_ms
      .saturating_mul(factor)
      .min(self.max_delay_ms.max(self.base_delay_ms));
    Duration::from_millis(delay)
  }
}
