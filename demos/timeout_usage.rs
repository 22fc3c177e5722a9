use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tracing::{info, warn};
use work_pool::logging::init_logging;
use work_pool::{Completion, PoolConfig, WorkFn, WorkPool};

#[tokio::main]
async fn main() {
  init_logging();

  info!("--- Timeout Example ---");

  // Completions of "stuck" jobs are parked here and reported far too late.
  let parked: Arc<Mutex<Vec<Completion<&'static str, String>>>> = Arc::new(Mutex::new(Vec::new()));
  let parked_clone = parked.clone();
  let work = WorkFn::new(2, move |params: &[&'static str], done: Completion<&'static str, String>| {
    match params[0] {
      "stuck" => parked_clone.lock().unwrap().push(done),
      name => {
        let name = name.to_string();
        done.spawn(async move {
          tokio::time::sleep(Duration::from_millis(100)).await;
          info!("{} finished in time", name);
          Ok(())
        });
      }
    }
    Ok(())
  });

  let pool = WorkPool::new(
    Some(work),
    PoolConfig::default()
      .with_name("timeout_pool")
      .with_capacity(1)
      .with_timeout_millis(300),
    Handle::current(),
  )
  .expect("work function declares a completion slot");

  let drained = Arc::new(Notify::new());
  let drained_clone = drained.clone();
  pool.on_drained(move || drained_clone.notify_one());
  pool.on_error(|error, task| {
    if error.is_timeout() {
      warn!("{} timed out and freed its slot", task.label());
    }
  });

  for name in ["quick", "stuck", "after_stuck"] {
    pool.add(vec![name]).expect("one parameter per job");
  }

  drained.notified().await;

  // The straggler reports success after its timeout; the pool ignores it.
  let stragglers: Vec<_> = parked.lock().unwrap().drain(..).collect();
  for done in stragglers {
    done.success();
  }

  let counts = pool.completion_counts();
  info!("Pool drained: {} succeeded, {} failed.", counts.success, counts.error);
  info!("--- Timeout Example End ---");
}
