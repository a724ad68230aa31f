use super::manager::WorkerStats;
use crate::pipeline::telemetry::PipelineMetrics;
use conveyor_core::{Order, OrderProcessor, ProcessContext};
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span};

/// Why a worker task stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// The channel was closed and every order had been taken.
    Drained,
    /// The shutdown token fired while the worker was waiting for an order.
    Cancelled,
}

/// Worker task that drains the shared order channel.
///
/// Each iteration waits for either the next order or the shutdown token,
/// whichever comes first. A received order is always handed to the processor
/// and awaited to completion; the token is only observed between orders.
///
/// A processing failure is logged inside the `ProcessOrder` span and counted,
/// and the worker moves on to the next order.
///
/// # Arguments
///
/// - `worker_id`: 1-based identifier used in logs and spans.
/// - `orders`: Shared receiver. Concurrent workers compete on it and each
///   order is delivered to exactly one of them.
/// - `processor`: Effect applied to each order.
/// - `shutdown`: Run-wide cancellation token.
/// - `parent`: Span under which every `ProcessOrder` span is opened.
pub async fn worker_loop<P>(
    worker_id: usize,
    orders: flume::Receiver<Order>,
    processor: Arc<P>,
    shutdown: CancellationToken,
    parent: Span,
    stats: Arc<WorkerStats>,
    metrics: PipelineMetrics,
) -> WorkerExit
where
    P: OrderProcessor,
{
    tracing::debug!("Worker {worker_id} started");
    metrics.increment_workers_active();

    let exit = loop {
        let order = tokio::select! {
            biased;

            () = shutdown.cancelled() => {
                tracing::debug!("Worker {worker_id} received shutdown signal");
                break WorkerExit::Cancelled;
            }
            res = orders.recv_async() => match res {
                Ok(order) => order,
                Err(flume::RecvError::Disconnected) => {
                    tracing::debug!("Worker {worker_id} found the order channel closed");
                    break WorkerExit::Drained;
                }
            },
        };

        let span = tracing::info_span!(
            parent: &parent,
            "ProcessOrder",
            worker.id = worker_id,
            order.id = order.id,
        );
        let ctx = ProcessContext::new(worker_id, span.clone());

        async {
            tracing::debug!("Worker {worker_id} received order {}", order.id);
            let started = Instant::now();

            match processor.process(&ctx, order).await {
                Ok(()) => {
                    stats.record_processed();
                    metrics.increment_orders_processed();
                }
                Err(e) => {
                    stats.record_failed();
                    metrics.increment_order_failures();
                    tracing::error!(
                        error = %e,
                        "Worker {worker_id} failed to process order {}",
                        order.id
                    );
                }
            }

            metrics.record_process_duration(started.elapsed().as_secs_f64() * 1000.0);
        }
        .instrument(span)
        .await;
    };

    metrics.decrement_workers_active();
    tracing::debug!("Worker {worker_id} stopped ({exit:?})");
    exit
}
