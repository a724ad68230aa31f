//! Pipeline coordinator.
//!
//! [`Pipeline`] wires the fan-out stage into the fan-in stage, owns the run's
//! [`CancellationToken`], and blocks until every worker has terminated.
//!
//! ## Run sequence
//!
//! 1. Start the generators ([`generate_orders`]); they share one rendezvous
//!    channel.
//! 2. Start the workers ([`WorkerPool::start_workers`]) on the receiving end,
//!    then close the [`TaskTracker`] so it can complete.
//! 3. Wait for the tracker. If the external shutdown future resolves first,
//!    fire the token and keep waiting.
//! 4. Join the generator supervisor so no task outlives the run.

use crate::pipeline::{
    config::PipelineConfig,
    generator::{OrderStream, generate_orders},
    pool::WorkerPool,
    telemetry::PipelineMetrics,
};
use conveyor_core::{OrderProcessor, Result};
use std::sync::Arc;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::Span;

/// Totals for a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Orders accepted by the channel.
    pub generated: u64,
    /// Orders the processor handled successfully.
    pub processed: u64,
    /// Orders the processor rejected.
    pub failed: u64,
    /// Whether the run was cut short by the shutdown token.
    pub cancelled: bool,
}

/// One run of the order pipeline.
///
/// A pipeline is consumed by [`Pipeline::run`] or [`Pipeline::run_until`];
/// the token it carries is never reset, so each run needs a new pipeline.
pub struct Pipeline<P> {
    config: PipelineConfig,
    processor: Arc<P>,
    shutdown: CancellationToken,
    metrics: PipelineMetrics,
    span: Span,
}

impl<P> Pipeline<P>
where
    P: OrderProcessor,
{
    pub fn new(config: PipelineConfig, processor: P) -> Self {
        Self::with_shared_processor(config, Arc::new(processor))
    }

    /// Like [`Pipeline::new`] but keeps a handle to the processor for the
    /// caller.
    pub fn with_shared_processor(config: PipelineConfig, processor: Arc<P>) -> Self {
        Self {
            config,
            processor,
            shutdown: CancellationToken::new(),
            metrics: PipelineMetrics::default(),
            span: Span::current(),
        }
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: PipelineMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Sets the span that parents every span the run opens.
    #[must_use]
    pub fn with_parent_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Returns a handle to the run's shutdown token.
    ///
    /// Cancelling it, from any task and any number of times, stops the run.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Fires the shutdown token. Repeated calls have no further effect.
    pub fn cancel(&self) {
        self.shutdown.cancel();
    }

    /// Runs until every generator is exhausted and every worker has drained
    /// the channel, or until the token is cancelled through
    /// [`Pipeline::shutdown_token`].
    ///
    /// # Errors
    ///
    /// See [`Pipeline::run_until`].
    pub async fn run(self) -> Result<RunSummary> {
        self.run_until(core::future::pending()).await
    }

    /// Runs the pipeline, firing the shutdown token if `shutdown` resolves
    /// before the workers are done.
    ///
    /// # Errors
    ///
    /// Returns [`conveyor_core::Error::TaskFailed`] if the generator
    /// supervisor panicked. Processing failures are never surfaced here; they
    /// are counted in [`RunSummary::failed`].
    pub async fn run_until<F>(self, shutdown: F) -> Result<RunSummary>
    where
        F: Future<Output = ()>,
    {
        let Self {
            config,
            processor,
            shutdown: token,
            metrics,
            span,
        } = self;

        tracing::info!(
            "Starting pipeline: {} generators x {} orders, {} workers",
            config.num_generators,
            config.orders_per_generator,
            config.num_workers
        );

        let OrderStream { orders, supervisor } =
            generate_orders(&token, &config, &span, &metrics);

        let pool = WorkerPool::new(processor, metrics);
        let tracker = TaskTracker::new();
        pool.start_workers(&token, config.num_workers, &orders, &tracker, &span);
        tracker.close();

        // Workers hold their own receivers; keeping this one would stop
        // generators from noticing that every worker is gone.
        drop(orders);

        tokio::select! {
            () = tracker.wait() => {}
            () = shutdown => {
                tracing::info!("Shutdown requested, cancelling generators and workers");
                token.cancel();
                tracker.wait().await;
            }
        }
        tracing::debug!("All workers finished");

        let generation = supervisor.join().await?;

        let summary = RunSummary {
            generated: generation.sent,
            processed: pool.stats().processed(),
            failed: pool.stats().failed(),
            cancelled: token.is_cancelled(),
        };

        tracing::info!(
            "Pipeline finished: {} generated, {} processed, {} failed{}",
            summary.generated,
            summary.processed,
            summary.failed,
            if summary.cancelled { " (cancelled)" } else { "" }
        );

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conveyor_core::{Order, ProcessContext};
    use core::time::Duration;

    struct Noop;

    impl OrderProcessor for Noop {
        async fn process(&self, _ctx: &ProcessContext, _order: Order) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn completes_without_cancellation() {
        let config = PipelineConfig::new(5, 10, 3).unwrap();
        let summary = Pipeline::new(config, Noop).run().await.unwrap();

        assert_eq!(
            summary,
            RunSummary {
                generated: 50,
                processed: 50,
                failed: 0,
                cancelled: false,
            }
        );
    }

    #[tokio::test]
    async fn empty_run_returns_immediately() {
        let config = PipelineConfig::new(0, 10, 2).unwrap();
        let summary = tokio::time::timeout(Duration::from_secs(5), Pipeline::new(config, Noop).run())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(summary, RunSummary::default());
    }

    #[tokio::test]
    async fn resolved_shutdown_future_cancels_the_run() {
        let config = PipelineConfig::new(3, 1_000, 2)
            .unwrap()
            .with_generate_delay(Duration::from_millis(5));

        let summary = tokio::time::timeout(
            Duration::from_secs(5),
            Pipeline::new(config, Noop).run_until(async {}),
        )
        .await
        .unwrap()
        .unwrap();

        assert!(summary.cancelled);
        assert!(summary.processed < 3_000);
    }

    #[tokio::test]
    async fn cancel_before_run_is_honoured() {
        let config = PipelineConfig::new(2, 1_000, 2).unwrap();
        let pipeline = Pipeline::new(config, Noop);
        pipeline.cancel();
        pipeline.cancel();

        let summary = tokio::time::timeout(Duration::from_secs(5), pipeline.run())
            .await
            .unwrap()
            .unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.processed, 0);
        assert_eq!(summary.generated, 0);
    }
}
