//! Exit status pattern matching with specificity ranking.
//!
//! A pattern is either a literal (exact, case-sensitive match) or a literal prefix followed by
//! a single trailing `*`. The bare pattern `*` matches everything.

use std::cmp::Ordering;

use tracing::instrument;

/// The wildcard character. Only valid as the last character of a pattern.
pub const WILDCARD: char = '*';

/// How specific a pattern is. Orders `Any < Prefix(shorter) < Prefix(longer) < Exact`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Specificity {
  /// The bare `*`.
  Any,
  /// A literal prefix of the given length followed by `*`.
  Prefix(usize),
  /// No wildcard.
  Exact,
}

impl Ord for Specificity {
  fn cmp(&self, other: &Self) -> Ordering {
    fn rank(s: &Specificity) -> (u8, usize) {
      match s {
        Specificity::Any => (0, 0),
        Specificity::Prefix(len) => (1, *len),
        Specificity::Exact => (2, 0),
      }
    }
    rank(self).cmp(&rank(other))
  }
}

impl PartialOrd for Specificity {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

/// Ranks a pattern. `**` and other degenerate forms rank by their literal prefix.
pub fn specificity(pattern: &str) -> Specificity {
  match pattern.strip_suffix(WILDCARD) {
    Some("") => Specificity::Any,
    Some(prefix) => Specificity::Prefix(prefix.chars().count()),
    None => Specificity::Exact,
  }
}

/// True if `pattern` is well formed: non-empty, `*` only in last position.
pub fn is_valid(pattern: &str) -> bool {
  if pattern.is_empty() {
    return false;
  }
  let literal = pattern.strip_suffix(WILDCARD).unwrap_or(pattern);
  !literal.contains(WILDCARD)
}

/// Matches an exit status against a pattern.
pub fn matches(pattern: &str, exit_status: &str) -> bool {
  match pattern.strip_suffix(WILDCARD) {
    Some(prefix) => exit_status.starts_with(prefix),
    None => pattern == exit_status,
  }
}

/// Picks the most specific pattern matching `exit_status`; among equals the first wins.
///
/// Returns the index into `patterns`.
#[instrument(level = "trace", skip(patterns))]
pub fn best_match<'a, I>(patterns: I, exit_status: &str) -> Option<usize>
where
  I: IntoIterator<Item = &'a str>,
{
  let mut best: Option<(usize, Specificity)> = None;
  for (idx, pattern) in patterns.into_iter().enumerate() {
    if !matches(pattern, exit_status) {
      continue;
    }
    let rank = specificity(pattern);
    if best.is_none_or(|(_, current)| rank > current) {
      best = Some((idx, rank));
    }
  }
  best.map(|(idx, _)| idx)
}
