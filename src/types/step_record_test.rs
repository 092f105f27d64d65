//! Tests for `StepRecord` and `StepFailure`.

use std::error::Error;
use std::fmt;

use super::{ExitStatus, StepFailure, StepRecord, StepStatus};

#[derive(Debug)]
struct Outer(Inner);

#[derive(Debug)]
struct Inner;

impl fmt::Display for Outer {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "write failed")
  }
}

impl fmt::Display for Inner {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "disk full")
  }
}

impl Error for Outer {
  fn source(&self) -> Option<&(dyn Error + 'static)> {
    Some(&self.0)
  }
}

impl Error for Inner {}

#[test]
fn status_from_exit() {
  assert_eq!(StepStatus::from_exit(&ExitStatus::failed()), StepStatus::Failed);
  assert_eq!(StepStatus::from_exit(&ExitStatus::stopped()), StepStatus::Stopped);
  assert_eq!(StepStatus::from_exit(&ExitStatus::new("NOOP")), StepStatus::Completed);
}

#[test]
fn finish_sets_status_and_end_time() {
  let mut record = StepRecord::started(true, false);
  assert_eq!(record.status, StepStatus::Started);
  assert!(!record.is_complete());
  record.finish(ExitStatus::completed());
  assert!(record.is_complete());
  assert!(record.ended_at.is_some());
  assert_eq!(record.exit_status, Some(ExitStatus::completed()));
}

#[test]
fn failure_captures_source_chain() {
  let err = Outer(Inner);
  let failure = StepFailure::from_error("load", &err, 2);
  assert_eq!(failure.state, "load");
  assert_eq!(failure.message, "write failed");
  assert_eq!(failure.causes, vec!["disk full".to_string()]);
  assert_eq!(failure.attempt, 2);
  assert!(failure.mentions("disk"));
  assert!(!failure.mentions("network"));
}
