use crate::completion::Completion;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Signature of the callable a pool runs for each task.
///
/// It receives the task's parameters and the task's completion callback. It
/// must not block; the outcome is reported later through the callback.
/// Returning `Err` is treated exactly like completing with that error.
pub type WorkCallable<P, E> = dyn Fn(&[P], Completion<P, E>) -> Result<(), E> + Send + Sync + 'static;

/// The work function of a pool together with its declared arity.
///
/// The arity counts the completion callback as the last parameter, the same
/// way a signature like `work(url, retries, done)` has arity 3. Tasks for
/// such a function are submitted with exactly `arity - 1` parameters.
pub struct WorkFn<P, E> {
  arity: usize,
  call: Arc<WorkCallable<P, E>>,
}

impl<P, E> Clone for WorkFn<P, E> {
  fn clone(&self) -> Self {
    Self {
      arity: self.arity,
      call: self.call.clone(),
    }
  }
}

impl<P, E> fmt::Debug for WorkFn<P, E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("WorkFn").field("arity", &self.arity).finish_non_exhaustive()
  }
}

impl<P, E> WorkFn<P, E> {
  pub fn new<F>(arity: usize, f: F) -> Self
  where
    F: Fn(&[P], Completion<P, E>) -> Result<(), E> + Send + Sync + 'static,
  {
    Self {
      arity,
      call: Arc::new(f),
    }
  }

  /// Declared arity, including the completion callback slot.
  pub fn arity(&self) -> usize {
    self.arity
  }

  /// Number of parameters each submission must carry, or `None` if the
  /// declared arity leaves no room for the completion callback.
  pub fn param_count(&self) -> Option<usize> {
    self.arity.checked_sub(1)
  }

  pub(crate) fn call(&self, params: &[P], done: Completion<P, E>) -> Result<(), E> {
    (self.call)(params, done)
  }
}

impl<P, E> WorkFn<P, E>
where
  P: fmt::Debug + Send + Sync + 'static,
  E: Send + 'static,
{
  /// Builds a work function from an async closure.
  ///
  /// The returned future is spawned on the pool's runtime and the task is
  /// completed with its output. A panic inside the future completes the task
  /// with `TaskError::Panicked`.
  pub fn from_async<F, Fut>(arity: usize, f: F) -> Self
  where
    F: Fn(&[P]) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
  {
    Self::new(arity, move |params, done| {
      done.spawn(f(params));
      Ok(())
    })
  }
}
