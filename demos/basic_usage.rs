use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tracing::info;
use work_pool::logging::init_logging;
use work_pool::{PoolConfig, WorkFn, WorkPool};

async fn my_task_fn(id: u64, delay_ms: u64) -> Result<(), String> {
  info!("Task {} starting, will sleep for {}ms", id, delay_ms);
  tokio::time::sleep(Duration::from_millis(delay_ms)).await;
  info!("Task {} finished after {}ms", id, delay_ms);
  Ok(())
}

#[tokio::main]
async fn main() {
  init_logging();

  info!("--- Basic Usage Example ---");

  let work = WorkFn::from_async(3, |params: &[u64]| my_task_fn(params[0], params[1]));
  let pool = WorkPool::new(
    Some(work),
    PoolConfig::default().with_name("basic_pool").with_capacity(2),
    Handle::current(),
  )
  .expect("work function declares a completion slot");

  let drained = std::sync::Arc::new(Notify::new());
  let drained_clone = drained.clone();
  pool.on_drained(move || drained_clone.notify_one());
  pool.on_success(|task| info!("Success: {}", task.label()));
  pool.on_error(|error, task| info!("Error for {}: {}", task.label(), error));

  for i in 0..5u64 {
    // Alternate sleep times for variety
    let sleep_duration = 500 + (i % 3 * 250);
    match pool.add(vec![i, sleep_duration]) {
      Ok(task_id) => info!("Submitted task {} as job {}", i, task_id),
      Err(e) => tracing::error!("Failed to submit task {}: {}", i, e),
    }
  }

  info!("All tasks submitted. Waiting for the pool to drain...");
  drained.notified().await;

  let counts = pool.completion_counts();
  info!("Pool drained: {} succeeded, {} failed.", counts.success, counts.error);
  info!("--- Basic Usage Example End ---");
}
