//! Tests for pattern matching and specificity ranking.

use proptest::prelude::*;

use crate::pattern::{Specificity, best_match, is_valid, matches, specificity};

#[test]
fn exact_pattern_is_case_sensitive() {
  assert!(matches("FAILED", "FAILED"));
  assert!(!matches("FAILED", "failed"));
  assert!(!matches("FAILED", "FAILED_HARD"));
}

#[test]
fn prefix_wildcard_matches_prefix() {
  assert!(matches("FAIL*", "FAILED"));
  assert!(matches("FAIL*", "FAIL"));
  assert!(!matches("FAIL*", "FAI"));
  assert!(!matches("FAIL*", "COMPLETED"));
}

#[test]
fn bare_wildcard_matches_everything() {
  assert!(matches("*", ""));
  assert!(matches("*", "ANYTHING"));
}

#[test]
fn specificity_ordering() {
  assert_eq!(specificity("*"), Specificity::Any);
  assert_eq!(specificity("COMP*"), Specificity::Prefix(4));
  assert_eq!(specificity("COMPLETED"), Specificity::Exact);
  assert!(Specificity::Exact > Specificity::Prefix(100));
  assert!(Specificity::Prefix(5) > Specificity::Prefix(4));
  assert!(Specificity::Prefix(0) > Specificity::Any);
}

#[test]
fn validity() {
  assert!(is_valid("*"));
  assert!(is_valid("FAIL*"));
  assert!(is_valid("COMPLETED"));
  assert!(!is_valid(""));
  assert!(!is_valid("F*D"));
  assert!(!is_valid("**"));
}

#[test]
fn best_match_prefers_exact_then_longest_prefix() {
  let patterns = ["*", "FAIL*", "FAILED", "F*"];
  assert_eq!(best_match(patterns, "FAILED"), Some(2));
  assert_eq!(best_match(patterns, "FAILURE"), Some(1));
  assert_eq!(best_match(patterns, "FOO"), Some(3));
  assert_eq!(best_match(patterns, "COMPLETED"), Some(0));
}

#[test]
fn best_match_ties_go_to_first_declared() {
  let patterns = ["C*", "X", "C*"];
  assert_eq!(best_match(patterns, "COMPLETED"), Some(0));
  let patterns = ["DONE", "DONE"];
  assert_eq!(best_match(patterns, "DONE"), Some(0));
}

#[test]
fn best_match_none_when_nothing_matches() {
  assert_eq!(best_match(["COMPLETED", "FAIL*"], "STOPPED"), None);
  assert_eq!(best_match(Vec::<&str>::new(), "STOPPED"), None);
}

proptest! {
  #[test]
  fn wildcard_matches_iff_prefix(prefix in "[A-Z_]{0,8}", outcome in "[A-Z_]{0,12}") {
    let pattern = format!("{prefix}*");
    prop_assert_eq!(matches(&pattern, &outcome), outcome.starts_with(&prefix));
  }

  #[test]
  fn literal_matches_iff_equal(pattern in "[A-Z]{1,6}", outcome in "[A-Z]{1,6}") {
    prop_assert_eq!(matches(&pattern, &outcome), pattern == outcome);
  }

  #[test]
  fn more_specific_match_always_wins(prefix in "[A-Z]{1,4}", rest in "[A-Z]{0,4}") {
    let outcome = format!("{prefix}{rest}");
    let patterns = vec!["*".to_string(), format!("{prefix}*"), outcome.clone()];
    let idx = best_match(patterns.iter().map(String::as_str), &outcome);
    prop_assert_eq!(idx, Some(2));
  }
}
