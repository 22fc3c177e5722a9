use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// Identifier of a task, unique within one pool and never reused.
pub type TaskId = u64;

/// One unit of submitted work plus its runtime state.
///
/// Tasks are owned by the pool. Observers only ever see them by reference
/// while a notification is being delivered.
pub struct Task<P> {
  id: TaskId,
  label: String,
  params: Vec<P>,
  // Mutated only while the pool's state lock is held.
  timed_out: AtomicBool,
  timeout_guard: Mutex<Option<CancellationToken>>,
}

impl<P: fmt::Debug> Task<P> {
  pub(crate) fn new(id: TaskId, params: Vec<P>) -> Self {
    let label = Self::describe(id, &params);
    Self {
      id,
      label,
      params,
      timed_out: AtomicBool::new(false),
      timeout_guard: Mutex::new(None),
    }
  }

  pub(crate) fn describe(id: TaskId, params: &[P]) -> String {
    format!("Job {} {:?}", id, params)
  }
}

impl<P> Task<P> {
  pub fn id(&self) -> TaskId {
    self.id
  }

  /// Human-readable description: the id followed by the parameters.
  pub fn label(&self) -> &str {
    &self.label
  }

  pub fn params(&self) -> &[P] {
    &self.params
  }

  pub fn is_timed_out(&self) -> bool {
    self.timed_out.load(Ordering::Acquire)
  }

  pub(crate) fn mark_timed_out(&self) {
    self.timed_out.store(true, Ordering::Release);
  }

  pub(crate) fn arm_timeout(&self, token: CancellationToken) {
    *self.timeout_guard.lock() = Some(token);
  }

  /// Cancels the pending timeout timer, if one is armed.
  pub(crate) fn disarm_timeout(&self) -> bool {
    match self.timeout_guard.lock().take() {
      Some(token) => {
        token.cancel();
        true
      }
      None => false,
    }
  }
}

impl<P> fmt::Debug for Task<P> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Task")
      .field("id", &self.id)
      .field("label", &self.label)
      .field("timed_out", &self.is_timed_out())
      .field("timeout_armed", &self.timeout_guard.lock().is_some())
      .finish()
  }
}
