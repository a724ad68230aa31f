//! Asynchronous worker pool for order processing.
//!
//! This module defines the [`WorkerPool`] struct, which starts a fixed number
//! of workers against one shared [`flume::Receiver`]. Workers compete for
//! orders on that receiver; the channel hands each order to exactly one of
//! them, so no claiming or locking happens on top of it.
//!
//! Every worker is spawned through a [`TaskTracker`], which registers it
//! before it starts and marks it done however it exits. The coordinator waits
//! on that tracker to learn that the fan-in stage has fully terminated.

use super::worker::worker_loop;
use crate::pipeline::telemetry::PipelineMetrics;
use conveyor_core::{Order, OrderProcessor};
use portable_atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{Instrument, Span};

/// Shared counters updated by every worker in a pool.
#[derive(Debug, Default)]
pub struct WorkerStats {
    processed: AtomicU64,
    failed: AtomicU64,
}

impl WorkerStats {
    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Orders the processor handled successfully.
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Orders the processor rejected.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// A pool of workers applying one [`OrderProcessor`] to a shared channel.
pub struct WorkerPool<P> {
    processor: Arc<P>,
    stats: Arc<WorkerStats>,
    metrics: PipelineMetrics,
}

impl<P> WorkerPool<P>
where
    P: OrderProcessor,
{
    pub fn new(processor: Arc<P>, metrics: PipelineMetrics) -> Self {
        Self {
            processor,
            stats: Arc::new(WorkerStats::default()),
            metrics,
        }
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Spawns `num_workers` workers, indexed from 1, onto `tracker`.
    ///
    /// Each worker gets its own clone of `orders` and of `shutdown`. The
    /// caller is responsible for closing the tracker and waiting on it.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_workers(
        &self,
        shutdown: &CancellationToken,
        num_workers: usize,
        orders: &flume::Receiver<Order>,
        tracker: &TaskTracker,
        parent: &Span,
    ) {
        tracing::info!("Starting {num_workers} workers");

        for worker_id in 1..=num_workers {
            tracker.spawn(
                worker_loop(
                    worker_id,
                    orders.clone(),
                    Arc::clone(&self.processor),
                    shutdown.clone(),
                    parent.clone(),
                    Arc::clone(&self.stats),
                    self.metrics.clone(),
                )
                .instrument(tracing::debug_span!(parent: parent, "Worker", worker.id = worker_id)),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conveyor_core::{ProcessContext, Result};
    use core::time::Duration;
    use parking_lot::Mutex;
    use std::collections::{HashMap, HashSet};

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(usize, u64)>>,
    }

    impl OrderProcessor for Recorder {
        async fn process(&self, ctx: &ProcessContext, order: Order) -> Result<()> {
            // Hold each order briefly so several workers get a share.
            tokio::time::sleep(Duration::from_millis(1)).await;
            self.seen.lock().push((ctx.worker_id(), order.id));
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn every_order_reaches_exactly_one_worker() {
        let (tx, rx) = flume::bounded(0);
        let processor = Arc::new(Recorder::default());
        let pool = WorkerPool::new(Arc::clone(&processor), PipelineMetrics::default());
        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();

        pool.start_workers(&shutdown, 4, &rx, &tracker, &Span::none());
        tracker.close();
        drop(rx);

        for id in 0..200 {
            tx.send_async(Order { id, value: id }).await.unwrap();
        }
        drop(tx);

        tokio::time::timeout(Duration::from_secs(10), tracker.wait())
            .await
            .unwrap();

        let seen = processor.seen.lock();
        let ids: HashSet<u64> = seen.iter().map(|(_, id)| *id).collect();
        assert_eq!(seen.len(), 200);
        assert_eq!(ids, (0..200).collect());
        assert_eq!(pool.stats().processed(), 200);

        let workers: HashMap<usize, usize> = seen.iter().fold(HashMap::new(), |mut acc, (w, _)| {
            *acc.entry(*w).or_default() += 1;
            acc
        });
        assert!(workers.keys().all(|w| (1..=4).contains(w)));
    }

    #[tokio::test]
    async fn tracker_reports_cancelled_workers() {
        let (_tx, rx) = flume::bounded::<Order>(0);
        let pool = WorkerPool::new(Arc::new(Recorder::default()), PipelineMetrics::default());
        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();

        pool.start_workers(&shutdown, 3, &rx, &tracker, &Span::none());
        tracker.close();
        assert_eq!(tracker.len(), 3);

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), tracker.wait())
            .await
            .unwrap();
        assert!(tracker.is_empty());
        assert_eq!(pool.stats().processed(), 0);
    }
}
