//! Exit status produced by executing a state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Exit status produced by executing a state.
///
/// The engine treats the code as opaque text: it is only ever compared against transition
/// patterns. The well-known codes below double as terminal marker names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExitStatus(String);

impl ExitStatus {
  pub const COMPLETED: &'static str = "COMPLETED";
  pub const FAILED: &'static str = "FAILED";
  pub const STOPPED: &'static str = "STOPPED";
  pub const UNKNOWN: &'static str = "UNKNOWN";

  pub fn new(code: impl Into<String>) -> Self {
    Self(code.into())
  }

  pub fn completed() -> Self {
    Self::new(Self::COMPLETED)
  }

  pub fn failed() -> Self {
    Self::new(Self::FAILED)
  }

  pub fn stopped() -> Self {
    Self::new(Self::STOPPED)
  }

  pub fn unknown() -> Self {
    Self::new(Self::UNKNOWN)
  }

  pub fn code(&self) -> &str {
    &self.0
  }

  pub fn is_failed(&self) -> bool {
    self.0 == Self::FAILED
  }

  pub fn is_stopped(&self) -> bool {
    self.0 == Self::STOPPED
  }
}

impl fmt::Display for ExitStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&str> for ExitStatus {
  fn from(code: &str) -> Self {
    Self::new(code)
  }
}

impl From<String> for ExitStatus {
  fn from(code: String) -> Self {
    Self(code)
  }
}

impl AsRef<str> for ExitStatus {
  fn as_ref(&self) -> &str {
    &self.0
  }
}
