//! Scheduler worker
//!
//! Background thread that sweeps all clusters every `interval`, owned by the
//! supervisor that boots the service and stopped through a cooperative
//! cancellation flag. There is no global scheduler instance and no state
//! carried between ticks.
//!
//! A panicking sweep never kills the worker: it is logged and retried after
//! a short backoff, matching the tick-failure policy of the design. Shutdown
//! is observed between ticks and during the interval sleep, so `stop`
//! returns within a fraction of the tick interval.

use crate::scheduler::tick::{Scheduler, TickReport};
use crate::store::Store;
use chrono::Utc;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Backoff after a failed sweep before retrying
const FAILURE_BACKOFF: Duration = Duration::from_secs(5);

/// Granularity of the cooperative interval sleep
const SHUTDOWN_POLL: Duration = Duration::from_millis(250);

/// Handle to the background scheduler thread
pub struct SchedulerWorker {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SchedulerWorker {
    /// Spawn the worker thread sweeping `store` every `interval`
    pub fn start(store: Arc<Store>, interval: Duration) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let handle = std::thread::spawn(move || worker_loop(store, interval, flag));
        Self {
            shutdown,
            handle: Some(handle),
        }
    }

    /// Signal shutdown and join the worker
    pub fn stop(mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SchedulerWorker {
    fn drop(&mut self) {
        // Dropping without stop() still signals the thread to exit
        self.shutdown.store(true, Ordering::Release);
    }
}

fn worker_loop(store: Arc<Store>, interval: Duration, shutdown: Arc<AtomicBool>) {
    info!(interval_secs = interval.as_secs(), "scheduler worker started");
    let scheduler = Scheduler::new(store);

    while !shutdown.load(Ordering::Acquire) {
        let sweep_started = Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(|| scheduler.schedule_all(Utc::now())));

        match outcome {
            Ok(reports) => {
                let mut totals = TickReport::default();
                for report in reports.values() {
                    totals.merge(report);
                }
                info!(
                    elapsed_ms = sweep_started.elapsed().as_millis() as u64,
                    clusters = reports.len(),
                    scheduled = totals.scheduled,
                    preempted = totals.preempted,
                    unschedulable = totals.unschedulable,
                    "scheduler sweep complete"
                );
                interruptible_sleep(interval, &shutdown);
            }
            Err(_) => {
                error!("scheduler sweep panicked; retrying after backoff");
                interruptible_sleep(FAILURE_BACKOFF, &shutdown);
            }
        }
    }

    info!("scheduler worker stopped");
}

/// Sleep for `total`, waking early when shutdown is signalled
fn interruptible_sleep(total: Duration, shutdown: &AtomicBool) {
    let deadline = Instant::now() + total;
    while !shutdown.load(Ordering::Acquire) {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        std::thread::sleep(remaining.min(SHUTDOWN_POLL));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_joins_promptly() {
        let store = Arc::new(Store::new());
        let worker = SchedulerWorker::start(store, Duration::from_secs(3600));

        // Give the first sweep a moment, then ask for shutdown; stop() must
        // return long before the interval elapses.
        std::thread::sleep(Duration::from_millis(50));
        let stopping = Instant::now();
        worker.stop();
        assert!(stopping.elapsed() < Duration::from_secs(5));
    }
}
