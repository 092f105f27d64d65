//! Cooperative stop signalling for job runs and split branches.
//!
//! A [StopSignal] is observed at state boundaries and between retry attempts; nothing is
//! interrupted mid-step. Signals nest: a child signal also reports stopped once any of its
//! ancestors is stopped.

use std::sync::Arc;

use tokio::sync::watch;

/// Requests a stop of every [StopSignal] derived from it.
#[derive(Debug, Clone)]
pub struct StopHandle {
  tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
  pub fn stop(&self) {
    self.tx.send_replace(true);
  }

  pub fn is_stopped(&self) -> bool {
    *self.tx.borrow()
  }
}

/// Read side of one or more stop handles.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
  receivers: Vec<watch::Receiver<bool>>,
}

impl StopSignal {
  /// A fresh, unstopped signal and the handle that stops it.
  pub fn new() -> (StopHandle, StopSignal) {
    StopSignal::default().child()
  }

  /// Signal that never fires.
  pub fn never() -> Self {
    Self::default()
  }

  /// Derives a signal that fires when either `self` or the returned handle fires.
  pub fn child(&self) -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    let mut receivers = self.receivers.clone();
    receivers.push(rx);
    (StopHandle { tx: Arc::new(tx) }, StopSignal { receivers })
  }

  pub fn is_stopped(&self) -> bool {
    self.receivers.iter().any(|rx| *rx.borrow())
  }
}
