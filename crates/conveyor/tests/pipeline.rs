use conveyor::{
    Error, Order, OrderProcessor, Pipeline, PipelineConfig, ProcessContext, Result, RunSummary,
    sink::WriterSink,
};
use core::time::Duration;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Records every order along with the worker that processed it. Orders whose
/// id is listed in `fail` are recorded and then rejected.
#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<(usize, Order)>>,
    fail: HashSet<u64>,
    delay: Duration,
}

impl Recorder {
    fn failing(ids: impl IntoIterator<Item = u64>) -> Self {
        Self {
            fail: ids.into_iter().collect(),
            ..Self::default()
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    fn ids(&self) -> Vec<u64> {
        self.seen.lock().iter().map(|(_, o)| o.id).collect()
    }
}

impl OrderProcessor for Recorder {
    async fn process(&self, ctx: &ProcessContext, order: Order) -> Result<()> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.seen.lock().push((ctx.worker_id(), order));
        if self.fail.contains(&order.id) {
            return Err(Error::processing(order.id, "rejected by test"));
        }
        Ok(())
    }
}

async fn run_with(config: PipelineConfig, recorder: &Arc<Recorder>) -> RunSummary {
    let pipeline = Pipeline::with_shared_processor(config, Arc::clone(recorder));
    tokio::time::timeout(Duration::from_secs(30), pipeline.run())
        .await
        .expect("pipeline did not finish")
        .expect("pipeline failed")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn five_generators_ten_orders_three_workers() {
    let recorder = Arc::new(Recorder::default());
    let config = PipelineConfig::new(5, 10, 3)
        .unwrap()
        .with_generate_delay(Duration::from_millis(1));

    let summary = run_with(config, &recorder).await;

    let mut ids = recorder.ids();
    ids.sort_unstable();
    assert_eq!(ids, (10..60).collect::<Vec<u64>>());
    assert_eq!(
        summary,
        RunSummary {
            generated: 50,
            processed: 50,
            failed: 0,
            cancelled: false,
        }
    );

    // Every worker task is gone once the run returns.
    assert_eq!(Arc::strong_count(&recorder), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_workers_neither_duplicate_nor_lose_orders() {
    let recorder = Arc::new(Recorder::default());
    let config = PipelineConfig::new(8, 25, 16).unwrap();

    let summary = run_with(config, &recorder).await;

    let ids = recorder.ids();
    let unique: HashSet<u64> = ids.iter().copied().collect();
    assert_eq!(ids.len(), 200);
    assert_eq!(unique.len(), 200);
    assert!(unique.iter().all(|id| (25..225).contains(id)));
    assert_eq!(summary.processed, 200);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn orders_from_one_generator_stay_in_sequence() {
    // A single worker observes the channel's delivery order directly.
    let recorder = Arc::new(Recorder::default());
    let config = PipelineConfig::new(4, 20, 1).unwrap();

    run_with(config, &recorder).await;

    let mut last: HashMap<u64, u64> = HashMap::new();
    for id in recorder.ids() {
        let generator = id / 20;
        let value = id % 20;
        if let Some(prev) = last.insert(generator, value) {
            assert!(value > prev, "generator {generator} reordered {prev} -> {value}");
        }
    }
    assert_eq!(last.len(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_orders_do_not_stop_other_orders() {
    let recorder = Arc::new(Recorder::failing([23, 41]));
    let config = PipelineConfig::new(5, 10, 3).unwrap();

    let summary = run_with(config, &recorder).await;

    assert_eq!(recorder.ids().len(), 50);
    assert_eq!(summary.processed, 48);
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.generated, 50);
}

#[tokio::test]
async fn worker_keeps_going_after_a_failure() {
    let recorder = Arc::new(Recorder::failing([10]));
    let config = PipelineConfig::new(1, 10, 1).unwrap();

    let summary = run_with(config, &recorder).await;

    let seen = recorder.seen.lock();
    assert_eq!(seen.len(), 10);
    assert_eq!(seen[0].1.id, 10);
    assert!(seen.iter().all(|(worker, _)| *worker == 1));
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.processed, 9);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn immediate_cancellation_returns_early() {
    let recorder = Arc::new(Recorder::slow(Duration::from_millis(20)));
    let config = PipelineConfig::new(5, 10, 3)
        .unwrap()
        .with_generate_delay(Duration::from_millis(10));
    let pipeline = Pipeline::with_shared_processor(config, Arc::clone(&recorder));

    let summary = tokio::time::timeout(Duration::from_secs(5), pipeline.run_until(async {}))
        .await
        .expect("cancelled pipeline did not finish")
        .unwrap();

    assert!(summary.cancelled);
    assert!(summary.processed < 50);
    assert!(recorder.ids().len() < 50);
    assert_eq!(Arc::strong_count(&recorder), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancelling_twice_matches_cancelling_once() {
    let recorder = Arc::new(Recorder::slow(Duration::from_millis(5)));
    let config = PipelineConfig::new(5, 1_000, 3)
        .unwrap()
        .with_generate_delay(Duration::from_millis(1));
    let pipeline = Pipeline::with_shared_processor(config, Arc::clone(&recorder));
    let token = pipeline.shutdown_token();

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
        token.cancel();
    });

    let summary = tokio::time::timeout(Duration::from_secs(5), pipeline.run())
        .await
        .expect("cancelled pipeline did not finish")
        .unwrap();
    canceller.await.unwrap();

    assert!(summary.cancelled);
    assert!(summary.processed > 0);
    assert!(summary.processed < 5_000);

    // Everything that reached a worker is distinct.
    let ids = recorder.ids();
    let unique: HashSet<u64> = ids.iter().copied().collect();
    assert_eq!(ids.len(), unique.len());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn writer_sink_gets_one_line_per_order() {
    let sink = Arc::new(WriterSink::new(Vec::new(), Duration::ZERO));
    let config = PipelineConfig::new(2, 5, 2).unwrap();

    let summary = Pipeline::with_shared_processor(config, Arc::clone(&sink))
        .run()
        .await
        .unwrap();
    assert_eq!(summary.processed, 10);

    let sink = Arc::try_unwrap(sink).expect("workers still hold the sink");
    let out = String::from_utf8(sink.into_inner()).unwrap();
    let mut lines: Vec<&str> = out.lines().collect();
    lines.sort_unstable();

    assert_eq!(lines.len(), 10);
    assert!(lines.contains(&"Order processed successfully: ID 5, Value 0"));
    assert!(lines.contains(&"Order processed successfully: ID 14, Value 4"));
}
