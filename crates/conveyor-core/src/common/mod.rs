pub mod error;
pub mod order;
pub mod processor;

pub use error::{Error, Result};
pub use order::Order;
pub use processor::{OrderProcessor, ProcessContext};
