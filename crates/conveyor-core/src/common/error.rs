//! Error types for the order pipeline.
//!
//! This module defines the central `Error` enum shared by the pipeline and any
//! [`OrderProcessor`](crate::OrderProcessor) implementation.
//!
//! ## Error Cases
//! - `Processing`: A processor failed to handle a single order. Workers log it
//!   and move on; it never aborts a run.
//! - `InvalidConfig`: The pipeline was configured with values it cannot run
//!   with.
//! - `ChannelError`: An internal communication failure between tasks.
//! - `TaskFailed`: A supervisory task panicked or was aborted.

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the order pipeline.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// Processing a single order failed.
    #[error("Failed to process order {order_id}: {reason}")]
    Processing { order_id: u64, reason: String },

    /// The pipeline configuration was rejected.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Internal channel send/receive failure.
    #[error("Channel error: {context}")]
    ChannelError { context: String },

    /// A background task did not run to completion.
    #[error("Task failed: {context}")]
    TaskFailed { context: String },
}

impl Error {
    /// Shorthand for a [`Error::Processing`] failure.
    pub fn processing(order_id: u64, reason: impl Into<String>) -> Self {
        Self::Processing {
            order_id,
            reason: reason.into(),
        }
    }
}
