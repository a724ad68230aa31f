use crate::pipeline::telemetry::PipelineMetrics;
use conveyor_core::Order;
use core::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span};

/// Why a generator task stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorExit {
    /// Every order was accepted by the channel.
    Exhausted,
    /// The shutdown token fired before all orders were sent.
    Cancelled,
    /// Every receiver was dropped; nobody is left to take orders.
    Disconnected,
}

/// Outcome of a single generator task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratorReport {
    pub generator_id: usize,
    pub sent: u64,
    pub exit: GeneratorExit,
}

/// Emits `orders_per_generator` orders for `generator_id` onto `tx`.
///
/// Orders are sent strictly in sequence order. Each send waits for a worker
/// to take the order (the channel has no buffer) and is raced against
/// `shutdown`; an order still on offer when the token fires is dropped and
/// the remaining orders are never created.
///
/// `tx` is dropped when this future completes, which is what lets the
/// supervisor's own sender be the last one standing.
pub async fn generator_loop(
    generator_id: usize,
    orders_per_generator: usize,
    delay: Duration,
    tx: flume::Sender<Order>,
    shutdown: CancellationToken,
    parent: Span,
    metrics: PipelineMetrics,
) -> GeneratorReport {
    tracing::debug!("Generator {generator_id} started");

    let mut report = GeneratorReport {
        generator_id,
        sent: 0,
        exit: GeneratorExit::Exhausted,
    };

    for sequence in 0..orders_per_generator as u64 {
        let order = Order::new(
            generator_id as u64,
            sequence,
            orders_per_generator as u64,
        );
        let span = tracing::info_span!(
            parent: &parent,
            "CreateOrder",
            generator.id = generator_id,
            order.id = order.id,
        );

        let step = async {
            if shutdown.is_cancelled() {
                tracing::error!("Generator {generator_id} cancelled before order {}", order.id);
                return Err(GeneratorExit::Cancelled);
            }

            // The send is polled first: once a worker has taken the order the
            // send must be reported as accepted, even if the token fired in
            // the meantime.
            tokio::select! {
                biased;

                res = tx.send_async(order) => {
                    if let Err(e) = res {
                        tracing::warn!("Generator {generator_id} has no receivers left: {e}");
                        return Err(GeneratorExit::Disconnected);
                    }
                }
                () = shutdown.cancelled() => {
                    tracing::error!(
                        "Generator {generator_id} cancelled before order {} was taken",
                        order.id
                    );
                    return Err(GeneratorExit::Cancelled);
                }
            }

            report.sent += 1;
            metrics.increment_orders_generated();

            // Simulated generation cost, still raced against the token so a
            // cancelled run does not wait it out.
            tokio::select! {
                biased;

                () = shutdown.cancelled() => Err(GeneratorExit::Cancelled),
                () = tokio::time::sleep(delay) => Ok(()),
            }
        }
        .instrument(span)
        .await;

        if let Err(exit) = step {
            report.exit = exit;
            break;
        }
    }

    tracing::debug!(
        "Generator {generator_id} stopped after {} orders ({:?})",
        report.sent,
        report.exit
    );
    report
}
