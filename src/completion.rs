use crate::error::TaskError;
use crate::pool::WorkPool;
use crate::task::{Task, TaskId};

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};

use futures::FutureExt;
use tokio::runtime::Handle as TokioHandle;
use tracing::{debug, error, warn};

/// Completion callback handed to the work function for one task.
///
/// Exactly one of `complete`, `success`, `fail` or `spawn` must eventually be
/// called. Each consumes the handle, so a single callback cannot report twice.
/// A completion that arrives after the task timed out is ignored.
pub struct Completion<P, E> {
  pool: Weak<WorkPool<P, E>>,
  task: Arc<Task<P>>,
  runtime: TokioHandle,
  settled: bool,
}

impl<P, E> fmt::Debug for Completion<P, E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Completion")
      .field("task_id", &self.task.id())
      .field("settled", &self.settled)
      .finish_non_exhaustive()
  }
}

impl<P, E> Completion<P, E> {
  pub(crate) fn new(pool: Weak<WorkPool<P, E>>, task: Arc<Task<P>>, runtime: TokioHandle) -> Self {
    Self {
      pool,
      task,
      runtime,
      settled: false,
    }
  }

  /// Returns the id of the task this callback belongs to.
  pub fn task_id(&self) -> TaskId {
    self.task.id()
  }
}

impl<P, E> Completion<P, E>
where
  P: fmt::Debug + Send + Sync + 'static,
  E: Send + 'static,
{
  /// Reports the task outcome: `Ok(())` for success, `Err(e)` for failure.
  pub fn complete(self, result: Result<(), E>) {
    self.settle(result.map_err(TaskError::Failed));
  }

  pub fn success(self) {
    self.complete(Ok(()));
  }

  pub fn fail(self, error: E) {
    self.complete(Err(error));
  }

  /// Spawns `fut` on the pool's runtime and completes the task with its output.
  pub fn spawn<F>(self, fut: F)
  where
    F: Future<Output = Result<(), E>> + Send + 'static,
  {
    let runtime = self.runtime.clone();
    runtime.spawn(async move {
      let outcome = match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result.map_err(TaskError::Failed),
        Err(_panic_payload) => {
          error!(task_id = %self.task.id(), "Spawned work future panicked.");
          Err(TaskError::Panicked {
            label: self.task.label().to_string(),
          })
        }
      };
      self.settle(outcome);
    });
  }

  fn settle(mut self, outcome: Result<(), TaskError<E>>) {
    self.settled = true;
    match self.pool.upgrade() {
      Some(pool) => pool.complete_task(&self.task, outcome),
      None => debug!(task_id = %self.task.id(), "Completion arrived after the pool was dropped. Ignoring."),
    }
  }
}

impl<P, E> Drop for Completion<P, E> {
  fn drop(&mut self) {
    if !self.settled && !self.task.is_timed_out() {
      warn!(
        task_id = %self.task.id(),
        label = %self.task.label(),
        "Completion callback dropped without being called. Unless the work function returned an error, the task stays in flight until it times out."
      );
    }
  }
}
