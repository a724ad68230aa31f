//! Fan-out stage: concurrent generators writing to one shared channel.
//!
//! - [`manager`] - Spawns the generator tasks and the supervisor that closes
//!   the channel once every generator has terminated.
//! - [`task`] - The per-generator send loop.

pub mod manager;
pub mod task;

pub use manager::{GenerationHandle, GenerationSummary, OrderStream, generate_orders};
pub use task::{GeneratorExit, GeneratorReport};
