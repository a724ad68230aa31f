use clap::Parser;
use conveyor_core::{Error, Order, Result};
use core::time::Duration;

/// Runtime configuration for the `conveyor` binary.
///
/// These settings control the fan-out width, the fan-in width, and the
/// simulated cost of producing and processing each order. All values are
/// parsed from CLI arguments or environment variables (a `.env` file is loaded
/// first when present).
#[derive(Parser, Debug, Clone)]
#[command(
    name = "conveyor",
    version,
    about = "Fan orders out from concurrent generators into a pool of workers"
)]
pub struct CliArgs {
    /// Number of concurrent generator tasks.
    ///
    /// Generators are indexed from 1. Zero is accepted and produces an empty
    /// run.
    ///
    /// Environment variable: `NUM_GENERATORS`
    #[arg(long, env = "NUM_GENERATORS", default_value_t = 5)]
    pub num_generators: usize,

    /// Number of orders each generator emits before it finishes.
    ///
    /// Environment variable: `ORDERS_PER_GENERATOR`
    #[arg(long, env = "ORDERS_PER_GENERATOR", default_value_t = 10)]
    pub orders_per_generator: usize,

    /// Number of worker tasks draining the shared order channel.
    ///
    /// Must be at least 1: the channel has no buffer, so generators would
    /// otherwise block until shutdown.
    ///
    /// Environment variable: `NUM_WORKERS`
    #[arg(long, env = "NUM_WORKERS", default_value_t = 3)]
    pub num_workers: usize,

    /// Simulated generation cost, in milliseconds, paid after each accepted
    /// send.
    ///
    /// Environment variable: `GENERATE_DELAY_MS`
    #[arg(long, env = "GENERATE_DELAY_MS", default_value_t = 10)]
    pub generate_delay_ms: u64,

    /// Simulated processing cost, in milliseconds, paid by the output sink
    /// for each order.
    ///
    /// Environment variable: `PROCESS_DELAY_MS`
    #[arg(long, env = "PROCESS_DELAY_MS", default_value_t = 50)]
    pub process_delay_ms: u64,
}

/// Validated pipeline settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub num_generators: usize,
    pub orders_per_generator: usize,
    pub num_workers: usize,
    pub generate_delay: Duration,
    pub process_delay: Duration,
}

impl PipelineConfig {
    /// Validates counts and returns a config with zero artificial delays.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `num_workers` is zero or if the
    /// largest order id would not fit in a `u64`.
    pub fn new(
        num_generators: usize,
        orders_per_generator: usize,
        num_workers: usize,
    ) -> Result<Self> {
        if num_workers == 0 {
            return Err(Error::InvalidConfig {
                reason: "NUM_WORKERS must be greater than 0".into(),
            });
        }

        if Order::max_id(num_generators as u64, orders_per_generator as u64).is_none() {
            return Err(Error::InvalidConfig {
                reason: format!(
                    "NUM_GENERATORS ({num_generators}) x ORDERS_PER_GENERATOR \
                     ({orders_per_generator}) overflows the order id space"
                ),
            });
        }

        Ok(Self {
            num_generators,
            orders_per_generator,
            num_workers,
            generate_delay: Duration::ZERO,
            process_delay: Duration::ZERO,
        })
    }

    #[must_use]
    pub const fn with_generate_delay(mut self, delay: Duration) -> Self {
        self.generate_delay = delay;
        self
    }

    #[must_use]
    pub const fn with_process_delay(mut self, delay: Duration) -> Self {
        self.process_delay = delay;
        self
    }

    /// Total number of orders a run produces when it is not cancelled.
    pub const fn total_orders(&self) -> usize {
        self.num_generators * self.orders_per_generator
    }
}

impl TryFrom<CliArgs> for PipelineConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> core::result::Result<Self, Self::Error> {
        let config = Self::new(
            args.num_generators,
            args.orders_per_generator,
            args.num_workers,
        )?
        .with_generate_delay(Duration::from_millis(args.generate_delay_ms))
        .with_process_delay(Duration::from_millis(args.process_delay_ms));

        Ok(config)
    }
}
