//! Concrete [`OrderProcessor`](conveyor_core::OrderProcessor) adapters.

pub mod writer;

pub use writer::{StdoutSink, WriterSink};
