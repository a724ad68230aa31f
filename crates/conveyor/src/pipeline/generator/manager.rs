//! Generator pool and channel-close supervisor.
//!
//! [`generate_orders`] creates the shared rendezvous channel, spawns one
//! [`generator_loop`] per generator into a [`JoinSet`], and spawns a
//! supervisor that waits for the whole set before dropping the last
//! [`flume::Sender`]. That drop is the only close event the channel ever
//! sees, and it cannot race an in-flight send because every other sender has
//! already been dropped by its terminated task.

use super::task::{GeneratorExit, GeneratorReport, generator_loop};
use crate::pipeline::{config::PipelineConfig, telemetry::PipelineMetrics};
use conveyor_core::{Error, Order, Result};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span};

/// Aggregated outcome of every generator in a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerationSummary {
    /// Orders accepted by the channel across all generators.
    pub sent: u64,
    pub exhausted: usize,
    pub cancelled: usize,
    pub disconnected: usize,
    /// Generator tasks that panicked.
    pub failed: usize,
}

impl GenerationSummary {
    fn record(&mut self, report: GeneratorReport) {
        self.sent += report.sent;
        match report.exit {
            GeneratorExit::Exhausted => self.exhausted += 1,
            GeneratorExit::Cancelled => self.cancelled += 1,
            GeneratorExit::Disconnected => self.disconnected += 1,
        }
    }
}

/// Handle to the channel-close supervisor.
#[derive(Debug)]
pub struct GenerationHandle(JoinHandle<GenerationSummary>);

impl GenerationHandle {
    /// Waits for every generator to terminate and the channel to close.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskFailed`] if the supervisor itself panicked or was
    /// aborted.
    pub async fn join(self) -> Result<GenerationSummary> {
        self.0.await.map_err(|e| Error::TaskFailed {
            context: format!("generator supervisor: {e}"),
        })
    }
}

/// The receiving end of the fan-out stage.
#[derive(Debug)]
pub struct OrderStream {
    /// Receive-only side of the shared channel. Yields `Disconnected` once all
    /// generators are done and every order has been taken.
    pub orders: flume::Receiver<Order>,
    pub supervisor: GenerationHandle,
}

/// Starts `config.num_generators` generators, indexed from 1, each emitting
/// `config.orders_per_generator` orders onto a shared unbuffered channel.
///
/// Must be called from within a Tokio runtime.
pub fn generate_orders(
    shutdown: &CancellationToken,
    config: &PipelineConfig,
    parent: &Span,
    metrics: &PipelineMetrics,
) -> OrderStream {
    let (tx, rx) = flume::bounded::<Order>(0);

    let span = tracing::info_span!(
        parent: parent,
        "GenerateAllOrders",
        num.generators = config.num_generators,
        orders.per.generator = config.orders_per_generator,
    );

    let mut tasks = JoinSet::new();
    for generator_id in 1..=config.num_generators {
        tasks.spawn(generator_loop(
            generator_id,
            config.orders_per_generator,
            config.generate_delay,
            tx.clone(),
            shutdown.clone(),
            span.clone(),
            metrics.clone(),
        ));
    }

    let supervisor = tokio::spawn(
        async move {
            let mut summary = GenerationSummary::default();

            while let Some(res) = tasks.join_next().await {
                match res {
                    Ok(report) => summary.record(report),
                    Err(e) => {
                        summary.failed += 1;
                        tracing::error!("Generator task failed: {e}");
                    }
                }
            }

            // Every generator has terminated and dropped its clone, so this is
            // the last sender: dropping it closes the channel.
            drop(tx);
            tracing::info!(
                "All generators finished ({} orders sent), order channel closed",
                summary.sent
            );

            summary
        }
        .instrument(span),
    );

    OrderStream {
        orders: rx,
        supervisor: GenerationHandle(supervisor),
    }
}
