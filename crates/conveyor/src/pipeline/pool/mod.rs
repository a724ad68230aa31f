//! Fan-in stage: a pool of workers draining the shared order channel.
//!
//! - [`manager`] - [`WorkerPool`](manager::WorkerPool), which spawns workers
//!   onto a completion tracker and owns the shared counters.
//! - [`worker`] - The per-worker receive/process loop.

pub mod manager;
pub mod worker;

pub use manager::{WorkerPool, WorkerStats};
pub use worker::WorkerExit;
