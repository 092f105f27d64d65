//! Tests for `Flow`.

use crate::error::{FlowError, ValidationError};
use crate::flow::Flow;
use crate::states::{State, tasklet_fn};
use crate::transition_table::TransitionTable;
use crate::types::ExitStatus;

fn step() -> State {
  State::step(tasklet_fn(|_| Ok(ExitStatus::completed())))
}

#[test]
fn valid_table_becomes_flow() {
  let table = TransitionTable::new()
    .with_state("a", step(), [("*", "COMPLETED")])
    .unwrap();
  let flow = Flow::new("job", "a", table).unwrap();
  assert_eq!(flow.name(), "job");
  assert_eq!(flow.start(), "a");
  assert!(flow.state("a").is_some());
  assert!(flow.state("b").is_none());
}

#[test]
fn missing_start_is_a_configuration_error() {
  let table = TransitionTable::new()
    .with_state("a", step(), [("*", "COMPLETED")])
    .unwrap();
  let err = Flow::new("job", "b", table).unwrap_err();
  assert_eq!(
    err,
    FlowError::Configuration(vec![ValidationError::MissingStart { start: "b".into() }])
  );
  assert!(err.is_configuration());
}

#[test]
fn dangling_target_prevents_construction() {
  let table = TransitionTable::new()
    .with_state("a", step(), [("*", "nope")])
    .unwrap();
  let err = Flow::new("job", "a", table).unwrap_err();
  match err {
    FlowError::Configuration(errors) => assert_eq!(errors.len(), 1),
    other => panic!("unexpected error: {other:?}"),
  }
}

#[test]
fn clones_share_the_definition() {
  let table = TransitionTable::new()
    .with_state("a", step(), [("*", "COMPLETED")])
    .unwrap();
  let flow = Flow::new("job", "a", table).unwrap();
  let copy = flow.clone();
  assert!(std::ptr::eq(flow.table(), copy.table()));
}
