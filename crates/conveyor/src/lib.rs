#![doc = include_str!("../README.md")]

pub mod pipeline;
pub mod sink;

pub use conveyor_core::{Error, Order, OrderProcessor, ProcessContext, Result};
pub use pipeline::{
    config::{CliArgs, PipelineConfig},
    coordinator::{Pipeline, RunSummary},
};
