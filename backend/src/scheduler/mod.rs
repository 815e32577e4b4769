//! Scheduler - periodic admission and preemption sweep
//!
//! See `tick.rs` for the per-cluster pass and `worker.rs` for the
//! background thread that drives it.

pub mod tick;
pub mod worker;

// Re-export main types for convenience
pub use tick::{Scheduler, SchedulerError, TickReport};
pub use worker::SchedulerWorker;
