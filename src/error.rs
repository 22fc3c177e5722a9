use std::time::Duration;

use thiserror::Error;

/// Usage errors returned synchronously by the `WorkPool` API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
  #[error("Required function to perform the work")]
  NoWorkFunction,

  #[error("Work function must reserve its last parameter for the completion callback (declared arity: {declared_arity})")]
  InvalidWorkFunction { declared_arity: usize },

  #[error("{label} requires {expected} parameters, got {actual}")]
  ArityMismatch {
    label: String,
    expected: usize,
    actual: usize,
  },
}

/// Terminal failure of a single task, delivered through `PoolEvent::Error`.
///
/// Never returned from a pool method: outcome errors only travel through the
/// notification path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError<E> {
  /// The work function reported a failure, either through its completion
  /// callback or by returning `Err` while it was being invoked.
  #[error("{0}")]
  Failed(E),

  /// The task did not complete within the pool's timeout.
  #[error("TIMEOUT: {label} (after {after:?})")]
  TimedOut { label: String, after: Duration },

  /// The work function panicked.
  #[error("Work function panicked: {label}")]
  Panicked { label: String },
}

impl<E> TaskError<E> {
  /// Returns `true` if this error was synthesized by the timeout timer.
  pub fn is_timeout(&self) -> bool {
    matches!(self, TaskError::TimedOut { .. })
  }

  /// Returns the work function's own error, if this is one.
  pub fn as_failure(&self) -> Option<&E> {
    match self {
      TaskError::Failed(e) => Some(e),
      _ => None,
    }
  }
}
