//! A bounded-concurrency work pool with FIFO admission, per-task timeouts,
//! completion accounting and lifecycle notifications.

mod completion;
mod config;
mod error;
mod notifier;
mod pool;
mod task;
mod work;

pub mod logging;

pub use completion::Completion;
pub use config::{PoolConfig, DEFAULT_CAPACITY};
pub use error::{PoolError, TaskError};
pub use notifier::{EventKind, PoolEvent};
pub use pool::{CompletionCounts, WorkPool};
pub use task::{Task, TaskId};
pub use work::{WorkCallable, WorkFn};
