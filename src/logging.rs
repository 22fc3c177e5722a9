use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable holding the log filter, e.g. `WORK_POOL_LOG=work_pool=debug`.
pub const LOG_FILTER_ENV: &str = "WORK_POOL_LOG";

/// Installs a console subscriber filtered by `WORK_POOL_LOG` (default `info`).
///
/// Returns `false` without touching anything if the application already
/// installed a global subscriber. Without any subscriber the pool logs nothing.
pub fn init_logging() -> bool {
  let filter = EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
  fmt::Subscriber::builder()
    .with_env_filter(filter)
    .with_target(true)
    .try_init()
    .is_ok()
}
