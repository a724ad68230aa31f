//! Pipeline stages and their coordination.
//!
//! ## Structure
//!
//! - [`config`] - CLI/env configuration and its validated form.
//! - [`generator`] - Fan-out: generator tasks and the channel-close
//!   supervisor.
//! - [`pool`] - Fan-in: worker tasks draining the shared channel.
//! - [`coordinator`] - [`Pipeline`](coordinator::Pipeline), which wires both
//!   stages together and owns the shutdown token.
//! - [`telemetry`] - Log subscriber, optional OpenTelemetry export and the
//!   metrics handle.

pub mod config;
pub mod coordinator;
pub mod generator;
pub mod pool;
pub mod telemetry;
