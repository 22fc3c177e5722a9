use crate::completion::Completion;
use crate::config::PoolConfig;
use crate::error::{PoolError, TaskError};
use crate::notifier::{Notifier, PoolEvent};
use crate::task::{Task, TaskId};
use crate::work::WorkFn;

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle as TokioHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

/// Aggregate outcome counters since the pool was created.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CompletionCounts {
  pub success: u64,
  pub error: u64,
}

/// A task waiting for admission, with the work function it was validated against.
struct QueuedTask<P, E> {
  task: Arc<Task<P>>,
  work: WorkFn<P, E>,
}

struct PoolState<P, E> {
  capacity: usize,
  timeout: Option<Duration>,
  next_task_id: TaskId,
  incoming: VecDeque<QueuedTask<P, E>>,
  in_flight: HashMap<TaskId, Arc<Task<P>>>,
  counts: CompletionCounts,
  has_had_work: bool,
  drain_pending: bool,
  // Queue-changed signals not yet processed, and whether a caller is processing them.
  pending_signals: usize,
  pumping: bool,
}

/// Result of one admission step.
enum Step<P, E> {
  Idle,
  Full,
  Drained,
  Admit(QueuedTask<P, E>, Option<Duration>),
}

/// Who is reporting a task outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
  Callback,
  Timeout,
}

/// Bounded-concurrency work pool.
///
/// Tasks are admitted in submission order while fewer than `capacity` are in
/// flight. Each admitted task runs the work function with its parameters and a
/// `Completion`; the pool learns the outcome through that callback, or from
/// the timeout timer if one is configured.
pub struct WorkPool<P, E> {
  pool_name: Arc<String>,
  tokio_handle: TokioHandle,
  self_ref: Weak<Self>,
  work: RwLock<Option<WorkFn<P, E>>>,
  state: Mutex<PoolState<P, E>>,
  notifier: Notifier<P, E>,
}

impl<P, E> fmt::Debug for WorkPool<P, E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = self.state.lock();
    f.debug_struct("WorkPool")
      .field("pool_name", &self.pool_name)
      .field("capacity", &state.capacity)
      .field("timeout", &state.timeout)
      .field("queued", &state.incoming.len())
      .field("in_flight", &state.in_flight.len())
      .field("counts", &state.counts)
      .field("notifier", &self.notifier)
      .finish_non_exhaustive()
  }
}

fn validate_work<P, E>(work: &WorkFn<P, E>) -> Result<(), PoolError> {
  match work.param_count() {
    Some(_) => Ok(()),
    None => Err(PoolError::InvalidWorkFunction {
      declared_arity: work.arity(),
    }),
  }
}

impl<P, E> WorkPool<P, E>
where
  P: fmt::Debug + Send + Sync + 'static,
  E: Send + 'static,
{
  /// Creates a pool. Timers and spawned work futures run on `tokio_handle`.
  ///
  /// The work function may be supplied later with `set_work`, but must be set
  /// before the first `add`.
  pub fn new(work: Option<WorkFn<P, E>>, config: PoolConfig, tokio_handle: TokioHandle) -> Result<Arc<Self>, PoolError> {
    if let Some(work) = &work {
      validate_work(work)?;
    }

    let pool_name = Arc::new(config.name);
    info!(pool_name = %*pool_name, capacity = config.capacity, timeout = ?config.timeout, "Creating work pool.");

    Ok(Arc::new_cyclic(|self_ref| Self {
      pool_name: pool_name.clone(),
      tokio_handle,
      self_ref: self_ref.clone(),
      work: RwLock::new(work),
      state: Mutex::new(PoolState {
        capacity: config.capacity.max(1),
        timeout: config.timeout.filter(|t| !t.is_zero()),
        next_task_id: 1,
        incoming: VecDeque::new(),
        in_flight: HashMap::new(),
        counts: CompletionCounts::default(),
        has_had_work: false,
        drain_pending: false,
        pending_signals: 0,
        pumping: false,
      }),
      notifier: Notifier::new(pool_name),
    }))
  }

  /// Installs or replaces the work function.
  ///
  /// Tasks already queued keep the function they were submitted against.
  pub fn set_work(&self, work: WorkFn<P, E>) -> Result<(), PoolError> {
    validate_work(&work)?;
    debug!(pool_name = %*self.pool_name, arity = work.arity(), "Work function set.");
    *self.work.write() = Some(work);
    Ok(())
  }

  pub fn name(&self) -> &str {
    &self.pool_name
  }

  pub fn capacity(&self) -> usize {
    self.state.lock().capacity
  }

  /// Changes the concurrency limit for subsequent admissions. Clamped to at least 1.
  pub fn set_capacity(&self, capacity: usize) {
    self.state.lock().capacity = capacity.max(1);
  }

  pub fn timeout(&self) -> Option<Duration> {
    self.state.lock().timeout
  }

  /// Changes the timeout armed for subsequently dispatched tasks.
  /// `None` or a zero duration disables it.
  pub fn set_timeout(&self, timeout: Option<Duration>) {
    self.state.lock().timeout = timeout.filter(|t| !t.is_zero());
  }

  pub fn completion_counts(&self) -> CompletionCounts {
    self.state.lock().counts
  }

  pub fn active_task_count(&self) -> usize {
    self.state.lock().in_flight.len()
  }

  /// Returns the current number of tasks waiting for admission.
  pub fn queued_task_count(&self) -> usize {
    self.state.lock().incoming.len()
  }

  /// Registers an observer for every pool event.
  pub fn subscribe(&self, handler: impl Fn(&PoolEvent<'_, P, E>) + Send + Sync + 'static) {
    self.notifier.add_handler(handler);
  }

  pub fn on_success(&self, handler: impl Fn(&Task<P>) + Send + Sync + 'static) {
    self.subscribe(move |event| {
      if let PoolEvent::Success { task } = event {
        handler(task);
      }
    });
  }

  pub fn on_error(&self, handler: impl Fn(&TaskError<E>, &Task<P>) + Send + Sync + 'static) {
    self.subscribe(move |event| {
      if let PoolEvent::Error { error, task } = event {
        handler(error, task);
      }
    });
  }

  pub fn on_done(&self, handler: impl Fn(&Task<P>) + Send + Sync + 'static) {
    self.subscribe(move |event| {
      if let PoolEvent::Done { task } = event {
        handler(task);
      }
    });
  }

  pub fn on_queue_changed(&self, handler: impl Fn() + Send + Sync + 'static) {
    self.subscribe(move |event| {
      if let PoolEvent::QueueChanged = event {
        handler();
      }
    });
  }

  pub fn on_drained(&self, handler: impl Fn() + Send + Sync + 'static) {
    self.subscribe(move |event| {
      if let PoolEvent::Drained = event {
        handler();
      }
    });
  }

  /// Submits one task.
  ///
  /// The number of parameters must match the work function's arity minus the
  /// completion slot. On success the task is queued and may already have been
  /// dispatched when this returns.
  pub fn add(&self, params: Vec<P>) -> Result<TaskId, PoolError> {
    let work = self.work.read().clone().ok_or(PoolError::NoWorkFunction)?;
    let expected = work.param_count().ok_or(PoolError::InvalidWorkFunction {
      declared_arity: work.arity(),
    })?;

    let (task_id, warn_no_timeout) = {
      let mut state = self.state.lock();
      let task_id = state.next_task_id;
      if params.len() != expected {
        return Err(PoolError::ArityMismatch {
          label: Task::<P>::describe(task_id, &params),
          expected,
          actual: params.len(),
        });
      }

      state.next_task_id += 1;
      let task = Arc::new(Task::new(task_id, params));
      let first_submission = !state.has_had_work;
      state.has_had_work = true;
      debug!(pool_name = %*self.pool_name, %task_id, label = %task.label(), "Queueing task.");
      state.incoming.push_back(QueuedTask { task, work });
      (task_id, first_submission && state.timeout.is_none())
    };

    if warn_no_timeout {
      warn!(
        pool_name = %*self.pool_name,
        "No timeout configured. A work function that never calls its completion callback will stall the pool."
      );
    }

    self.signal_queue_changed();
    Ok(task_id)
  }

  /// Records one "queue changed" signal and, unless another caller is already
  /// doing so, processes pending signals one admission step at a time.
  fn signal_queue_changed(&self) {
    {
      let mut state = self.state.lock();
      state.pending_signals += 1;
      if state.pumping {
        return;
      }
      state.pumping = true;
    }

    loop {
      let step = {
        let mut state = self.state.lock();
        state.pending_signals -= 1;
        self.admission_step(&mut state)
      };

      self.notifier.emit(&PoolEvent::QueueChanged);
      match step {
        Step::Drained => {
          info!(pool_name = %*self.pool_name, "Pool drained.");
          self.notifier.emit(&PoolEvent::Drained);
        }
        Step::Admit(queued, timeout) => self.run_task(queued, timeout),
        Step::Idle | Step::Full => {}
      }

      let mut state = self.state.lock();
      if state.pending_signals == 0 {
        state.pumping = false;
        break;
      }
    }
  }

  /// Admits at most one task.
  fn admission_step(&self, state: &mut PoolState<P, E>) -> Step<P, E> {
    let running = state.in_flight.len();

    if state.incoming.is_empty() {
      trace!(pool_name = %*self.pool_name, waiting = state.drain_pending, running, "No work to do.");
      if state.drain_pending && running == 0 {
        state.drain_pending = false;
        return Step::Drained;
      }
      return Step::Idle;
    }

    state.drain_pending = true;
    if running >= state.capacity {
      trace!(pool_name = %*self.pool_name, running, capacity = state.capacity, "No room for a new task.");
      return Step::Full;
    }

    let Some(queued) = state.incoming.pop_front() else {
      return Step::Idle;
    };
    state.in_flight.insert(queued.task.id(), queued.task.clone());
    Step::Admit(queued, state.timeout)
  }

  fn run_task(&self, queued: QueuedTask<P, E>, timeout: Option<Duration>) {
    let QueuedTask { task, work } = queued;
    debug!(pool_name = %*self.pool_name, task_id = %task.id(), label = %task.label(), "Running task.");

    if let Some(after) = timeout {
      self.arm_timeout(&task, after);
    }

    let done = Completion::new(self.self_ref.clone(), task.clone(), self.tokio_handle.clone());
    match catch_unwind(AssertUnwindSafe(|| work.call(task.params(), done))) {
      Ok(Ok(())) => {}
      Ok(Err(e)) => {
        debug!(pool_name = %*self.pool_name, task_id = %task.id(), "Work function returned an error while being invoked.");
        self.finish(&task, Err(TaskError::Failed(e)), Origin::Callback);
      }
      Err(_panic_payload) => {
        error!(pool_name = %*self.pool_name, task_id = %task.id(), "Work function panicked while being invoked.");
        let label = task.label().to_string();
        self.finish(&task, Err(TaskError::Panicked { label }), Origin::Callback);
      }
    }
  }

  fn arm_timeout(&self, task: &Arc<Task<P>>, after: Duration) {
    let token = CancellationToken::new();
    task.arm_timeout(token.clone());

    let pool = self.self_ref.clone();
    let timed_task = task.clone();
    self.tokio_handle.spawn(
      async move {
        tokio::select! {
          biased;
          _ = token.cancelled() => {
            trace!("Timeout disarmed before firing.");
          }
          _ = tokio::time::sleep(after) => {
            if let Some(pool) = pool.upgrade() {
              pool.timed_out(&timed_task, after);
            }
          }
        }
      }
      .instrument(info_span!("task_timeout", pool_name = %*self.pool_name, task_id = %task.id())),
    );
  }

  fn timed_out(&self, task: &Task<P>, after: Duration) {
    warn!(pool_name = %*self.pool_name, task_id = %task.id(), label = %task.label(), ?after, "Task timed out.");
    let error = TaskError::TimedOut {
      label: task.label().to_string(),
      after,
    };
    self.finish(task, Err(error), Origin::Timeout);
  }

  /// Entry point for `Completion`.
  pub(crate) fn complete_task(&self, task: &Task<P>, outcome: Result<(), TaskError<E>>) {
    self.finish(task, outcome, Origin::Callback);
  }

  /// The single completion path shared by callbacks, synchronous work errors
  /// and the timeout timer.
  fn finish(&self, task: &Task<P>, outcome: Result<(), TaskError<E>>, origin: Origin) {
    {
      let mut state = self.state.lock();

      if task.is_timed_out() {
        drop(state);
        if origin == Origin::Timeout {
          error!(pool_name = %*self.pool_name, label = %task.label(), "Timeout fired twice.");
          panic!("{} already timed out", task.label());
        }
        match &outcome {
          Ok(()) => debug!(pool_name = %*self.pool_name, "Ignoring timed-out {}", task.label()),
          Err(_) => debug!(pool_name = %*self.pool_name, "Ignoring timed-out {} with error", task.label()),
        }
        return;
      }

      if origin == Origin::Callback {
        task.disarm_timeout();
      }

      if state.in_flight.remove(&task.id()).is_none() {
        drop(state);
        if origin == Origin::Timeout {
          // The normal completion won the race against the timer.
          trace!(pool_name = %*self.pool_name, task_id = %task.id(), "Timer fired after completion. Ignoring.");
          return;
        }
        let kind = if outcome.is_ok() { "Success" } else { "Failed" };
        error!(pool_name = %*self.pool_name, label = %task.label(), "Completion for a task that is not in flight.");
        panic!("{} {} ID not known: {}", kind, task.label(), task.id());
      }

      match &outcome {
        Ok(()) => state.counts.success += 1,
        Err(_) => state.counts.error += 1,
      }
      if origin == Origin::Timeout {
        // Late completions from the work function are ignored from here on.
        task.mark_timed_out();
      }
    }

    match &outcome {
      Ok(()) => {
        debug!(pool_name = %*self.pool_name, task_id = %task.id(), "Task succeeded.");
        self.notifier.emit(&PoolEvent::Success { task });
      }
      Err(error) => {
        debug!(pool_name = %*self.pool_name, task_id = %task.id(), timeout = error.is_timeout(), "Task failed.");
        self.notifier.emit(&PoolEvent::Error { error, task });
      }
    }
    self.notifier.emit(&PoolEvent::Done { task });
    self.signal_queue_changed();
  }
}

impl<P, E> Drop for WorkPool<P, E> {
  fn drop(&mut self) {
    let state = self.state.get_mut();
    let armed = state.in_flight.values().filter(|task| task.disarm_timeout()).count();
    if !state.incoming.is_empty() || !state.in_flight.is_empty() {
      info!(
        pool_name = %*self.pool_name,
        queued = state.incoming.len(),
        in_flight = state.in_flight.len(),
        armed_timers = armed,
        "WorkPool dropped with pending work. Queued tasks will not run."
      );
    } else {
      trace!(pool_name = %*self.pool_name, "WorkPool dropped while idle.");
    }
  }
}
