//! Tests for the error taxonomy.

use std::error::Error;

use crate::error::{FailureKind, FlowError, StepError, ValidationError};

#[test]
fn configuration_errors_are_classified() {
  assert_eq!(
    FlowError::DuplicateState("a".into()).kind(),
    FailureKind::Configuration
  );
  assert!(FlowError::Configuration(vec![]).is_configuration());
  assert_eq!(
    FlowError::UnresolvedTransition {
      state: "a".into(),
      exit_status: "X".into(),
    }
    .kind(),
    FailureKind::Runtime
  );
  assert_eq!(
    FlowError::NonRestartableStep("a".into()).kind(),
    FailureKind::Runtime
  );
}

#[test]
fn configuration_message_lists_all_problems() {
  let err = FlowError::Configuration(vec![
    ValidationError::MissingStart {
      start: "begin".into(),
    },
    ValidationError::NoTransitions { state: "a".into() },
  ]);
  let msg = err.to_string();
  assert!(msg.contains("'begin'"));
  assert!(msg.contains("state 'a' has no outgoing transitions"));
}

#[test]
fn step_error_flags() {
  let e = StepError::new("boom");
  assert!(e.is_retryable());
  assert!(!e.is_skippable());
  let e = StepError::new("bad record").fatal().skippable();
  assert!(!e.is_retryable());
  assert!(e.is_skippable());
  assert_eq!(e.message(), "bad record");
}

#[test]
fn step_error_keeps_source() {
  let io = std::io::Error::other("connection reset");
  let e = StepError::caused_by("fetch failed", io);
  assert_eq!(e.to_string(), "fetch failed");
  assert_eq!(e.source().map(|s| s.to_string()).as_deref(), Some("connection reset"));
}

#[test]
fn io_errors_convert_with_cause() {
  let e: StepError = std::io::Error::other("gone").into();
  assert!(e.is_retryable());
  assert!(e.source().is_some());
}
