//! A routing rule between states.

/// `(from, pattern, to)`: when state `from` reports an exit status matching `pattern`, continue
/// at `to` (a state name or a terminal marker).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
  pub from: String,
  pub pattern: String,
  pub to: String,
}

impl Transition {
  pub fn new(from: impl Into<String>, pattern: impl Into<String>, to: impl Into<String>) -> Self {
    Self {
      from: from.into(),
      pattern: pattern.into(),
      to: to.into(),
    }
  }
}
