//! Tests for `EndState`.

use super::EndState;
use crate::types::{ExecutionContext, FlowStatus};

#[test]
fn default_exit_status_is_marker() {
  assert_eq!(EndState::completed().exit_status().code(), "COMPLETED");
  assert_eq!(EndState::failed().exit_status().code(), "FAILED");
  assert_eq!(EndState::stopped().exit_status().code(), "STOPPED");
}

#[test]
fn custom_exit_code_keeps_status() {
  let end = EndState::failed().with_exit_code("BAD_INPUT");
  assert_eq!(end.status(), FlowStatus::Failed);
  assert_eq!(end.exit_status().code(), "BAD_INPUT");
}

#[test]
fn stop_with_restart_sets_resume_target() {
  let end = EndState::stopped().with_restart("publish");
  let mut ctx = ExecutionContext::new();
  let exit = end.execute("", &mut ctx);
  assert!(exit.is_stopped());
  assert_eq!(ctx.take_resume_target("").as_deref(), Some("publish"));
}

#[test]
fn restart_ignored_for_non_stop() {
  let end = EndState::completed().with_restart("x");
  let mut ctx = ExecutionContext::new();
  end.execute("", &mut ctx);
  assert_eq!(ctx.take_resume_target(""), None);
}
