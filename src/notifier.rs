use crate::error::TaskError;
use crate::task::Task;

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, error, trace};

/// Lifecycle notification emitted by a `WorkPool`.
///
/// Delivered synchronously, after the pool state it describes has been
/// updated.
#[derive(Debug)]
pub enum PoolEvent<'a, P, E> {
  /// The task completed without error.
  Success { task: &'a Task<P> },
  /// The task failed, panicked or timed out.
  Error { error: &'a TaskError<E>, task: &'a Task<P> },
  /// Fired after every terminal outcome, once the task left the pool.
  Done { task: &'a Task<P> },
  /// Admission state may have changed.
  QueueChanged,
  /// The pool went from having work to fully idle.
  Drained,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
  Success,
  Error,
  Done,
  QueueChanged,
  Drained,
}

impl<'a, P, E> PoolEvent<'a, P, E> {
  pub fn kind(&self) -> EventKind {
    match self {
      PoolEvent::Success { .. } => EventKind::Success,
      PoolEvent::Error { .. } => EventKind::Error,
      PoolEvent::Done { .. } => EventKind::Done,
      PoolEvent::QueueChanged => EventKind::QueueChanged,
      PoolEvent::Drained => EventKind::Drained,
    }
  }

  /// The task this event is about, for per-task events.
  pub fn task(&self) -> Option<&'a Task<P>> {
    match self {
      PoolEvent::Success { task } | PoolEvent::Error { task, .. } | PoolEvent::Done { task } => Some(*task),
      PoolEvent::QueueChanged | PoolEvent::Drained => None,
    }
  }
}

pub(crate) type EventHandler<P, E> = Arc<dyn Fn(&PoolEvent<'_, P, E>) + Send + Sync + 'static>;

/// Registry of observers for one pool.
pub(crate) struct Notifier<P, E> {
  pool_name: Arc<String>,
  handlers: RwLock<Vec<EventHandler<P, E>>>,
}

impl<P, E> fmt::Debug for Notifier<P, E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Notifier")
      .field("pool_name", &self.pool_name)
      .field("handler_count", &self.handler_count())
      .finish()
  }
}

impl<P, E> Notifier<P, E> {
  pub(crate) fn new(pool_name: Arc<String>) -> Self {
    Self {
      pool_name,
      handlers: RwLock::new(Vec::new()),
    }
  }

  pub(crate) fn add_handler(&self, handler: impl Fn(&PoolEvent<'_, P, E>) + Send + Sync + 'static) {
    let mut handlers_guard = self.handlers.write();
    handlers_guard.push(Arc::new(handler));
    debug!(pool_name = %*self.pool_name, "Notifier: Added new observer. Total observers: {}", handlers_guard.len());
  }

  pub(crate) fn handler_count(&self) -> usize {
    self.handlers.read().len()
  }

  /// Delivers `event` to every observer in registration order.
  ///
  /// A panicking observer is logged and skipped; the remaining observers
  /// still run and the panic never reaches the caller.
  pub(crate) fn emit(&self, event: &PoolEvent<'_, P, E>) {
    // Snapshot so observers may register further observers while handling.
    let handlers: Vec<EventHandler<P, E>> = self.handlers.read().clone();
    if handlers.is_empty() {
      trace!(pool_name = %*self.pool_name, kind = ?event.kind(), "No observers registered, dropping notification.");
      return;
    }

    for handler in handlers.iter() {
      let result = catch_unwind(AssertUnwindSafe(|| handler(event)));
      if result.is_err() {
        error!(
          pool_name = %*self.pool_name,
          kind = ?event.kind(),
          task_id = ?event.task().map(|t| t.id()),
          "An observer panicked while handling a pool event."
        );
      }
    }
  }
}
