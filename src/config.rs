use std::time::Duration;

/// Default number of tasks allowed in flight at once.
pub const DEFAULT_CAPACITY: usize = 10;

/// Construction parameters for a `WorkPool`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
  /// Name used in log records.
  pub name: String,
  /// Maximum number of tasks in flight. Always at least 1.
  pub capacity: usize,
  /// Per-task timeout. `None` disables it.
  pub timeout: Option<Duration>,
}

impl Default for PoolConfig {
  fn default() -> Self {
    Self {
      name: "work_pool".to_string(),
      capacity: DEFAULT_CAPACITY,
      timeout: None,
    }
  }
}

impl PoolConfig {
  pub fn with_name(mut self, name: &str) -> Self {
    self.name = name.to_string();
    self
  }

  pub fn with_capacity(mut self, capacity: usize) -> Self {
    self.capacity = capacity.max(1);
    self
  }

  pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
    self.timeout = timeout.filter(|t| !t.is_zero());
    self
  }

  /// Sets the timeout in milliseconds. `0` disables it.
  pub fn with_timeout_millis(self, millis: u64) -> Self {
    self.with_timeout(Some(Duration::from_millis(millis)))
  }
}
