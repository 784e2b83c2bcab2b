//! Optimistic local state for mutating actions.

use std::future::Future;

/// A locally held value that is updated before a mutation completes and
/// rolled back if it fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Optimistic<V> {
  value: V,
  pending: bool,
}

impl<V> Optimistic<V> {
  pub fn new(value: V) -> Self {
    Self {
      value,
      pending: false,
    }
  }

  pub fn get(&self) -> &V {
    &self.value
  }

  /// True while a mutation is in flight.
  pub fn is_pending(&self) -> bool {
    self.pending
  }

  /// Show `next` immediately, then await `op`. On failure the previous
  /// value is restored and the error returned unchanged.
  pub async fn apply<F, E>(&mut self, next: V, op: F) -> Result<(), E>
  where
    F: Future<Output = Result<(), E>>,
  {
    let previous = std::mem::replace(&mut self.value, next);
    self.pending = true;
    let result = op.await;
    self.pending = false;
    if result.is_err() {
      self.value = previous;
    }
    result
  }
}
