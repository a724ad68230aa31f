//! # Telemetry Features
//!
//! Console logging through `tracing_subscriber::fmt` is always on. Export of
//! spans and metrics via OpenTelemetry is opt-in.
//!
//! ## Feature matrix
//!
//! - `otel`: Enables OpenTelemetry distributed tracing (via spans).
//! - `metrics`: Enables OpenTelemetry metrics (counters, histograms).
//! - `stdout`: Enables the stdout exporter.
//! - `otlp`: Enables the OTLP/gRPC exporter. Requires `OTLP_ENDPOINT`.
//!
//! ## Feature constraints
//!
//! - Exporters require using at least one of: `otel` or `metrics`.
//! - Both `otlp` and `stdout` exporters can be enabled at the same time.
//!
//! ## Span behavior
//!
//! - The pipeline emits `GenerateAllOrders`, `CreateOrder`, `ProcessOrder`
//!   and `LogToStdout` spans. Parents are passed explicitly down the call
//!   chain, never looked up from a global tracer.
//! - Error events inside a span are exported as span exceptions.
//! - Events outside of a span are only shown in log output.
//!
//! ## Metrics behavior
//!
//! - Instruments live in a [`PipelineMetrics`] handle that the coordinator
//!   hands to each pool. Without the `metrics` feature every method is a
//!   no-op.
//!
//! ## Example usage
//!
//! ```bash
//! cargo run --features otel,stdout
//! cargo run --features otel,metrics,otlp
//! ```

// Disallow using `otlp` without `otel` or `metrics`
#[cfg(all(feature = "otlp", not(any(feature = "otel", feature = "metrics"))))]
compile_error!("The 'otlp' feature requires at least one of 'otel' or 'metrics' to be enabled.");

// Disallow using `stdout` without `otel` or `metrics`
#[cfg(all(feature = "stdout", not(any(feature = "otel", feature = "metrics"))))]
compile_error!("The 'stdout' feature requires at least one of 'otel' or 'metrics' to be enabled.");

// Core imports - always needed
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

// OTLP-specific imports
#[cfg(all(feature = "otlp", any(feature = "metrics", feature = "otel")))]
use opentelemetry_otlp::{Protocol, WithExportConfig};
#[cfg(all(feature = "otlp", feature = "metrics"))]
use opentelemetry_sdk::metrics::Temporality;

// Metrics-specific imports
#[cfg(feature = "metrics")]
use opentelemetry::metrics::{Counter, Histogram, Meter, UpDownCounter};
#[cfg(feature = "metrics")]
use opentelemetry_sdk::metrics as sdkmetrics;
#[cfg(feature = "metrics")]
use std::sync::Arc;

// Either
#[cfg(any(feature = "metrics", feature = "otel"))]
use opentelemetry::{InstrumentationScope, KeyValue};
#[cfg(any(feature = "metrics", feature = "otel"))]
use opentelemetry_sdk::Resource;
#[cfg(any(feature = "metrics", feature = "otel"))]
use opentelemetry_semantic_conventions as semvcns;

// Tracing-specific imports
#[cfg(feature = "otel")]
use opentelemetry::trace::TracerProvider;
#[cfg(feature = "otel")]
use opentelemetry_sdk::propagation::TraceContextPropagator;
#[cfg(feature = "otel")]
use opentelemetry_sdk::trace as sdktrace;

pub struct TelemetryProviders {
    #[cfg(feature = "otel")]
    pub tracer_provider: sdktrace::SdkTracerProvider,
    #[cfg(feature = "metrics")]
    pub meter_provider: sdkmetrics::SdkMeterProvider,
    pub metrics: PipelineMetrics,
}

impl TelemetryProviders {
    /// Flushes and shuts down every exporter. Errors are reported on stderr
    /// since the subscriber may already be unable to deliver them.
    pub fn shutdown(self) {
        #[cfg(feature = "otel")]
        {
            if let Err(err) = self.tracer_provider.force_flush() {
                eprintln!("Error flushing traces: {err:#?}");
            }
            if let Err(err) = self.tracer_provider.shutdown() {
                eprintln!("Error shutting down tracer: {err:#?}");
            }
        }

        #[cfg(feature = "metrics")]
        {
            if let Err(err) = self.meter_provider.force_flush() {
                eprintln!("Error flushing metrics: {err:#?}");
            }
            if let Err(err) = self.meter_provider.shutdown() {
                eprintln!("Error shutting down meter: {err:#?}");
            }
        }
    }
}

/// Installs the global subscriber and builds the enabled exporters.
///
/// # Errors
///
/// Returns an error if an exporter cannot be configured. The caller should
/// treat this as fatal and abort before starting the pipeline.
pub fn init_telemetry() -> anyhow::Result<TelemetryProviders> {
    #[cfg(feature = "otel")]
    opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());

    #[cfg(feature = "otel")]
    let tracer_provider = init_tracer()?;

    #[cfg(feature = "metrics")]
    let meter_provider = init_metrics()?;

    #[cfg(any(feature = "metrics", feature = "otel"))]
    let scope = InstrumentationScope::builder("conveyor")
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_schema_url(semvcns::SCHEMA_URL)
        .build();

    // Always subscribe to standard tracing logs printed to the console via
    // `tracing_subscriber::fmt`. This is unrelated to the `opentelemetry_stdout`
    // exporter - it logs spans/events as human-readable output.
    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_ids(true)
                .with_line_number(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                .with_file(true)
                .pretty(),
        );

    #[cfg(feature = "otel")]
    let registry = registry.with(
        tracing_opentelemetry::layer()
            .with_tracer(tracer_provider.tracer_with_scope(scope.clone()))
            .with_error_records_to_exceptions(true),
    );

    #[cfg(feature = "metrics")]
    let (registry, metrics) = {
        use opentelemetry::metrics::MeterProvider;

        let meter = meter_provider.meter_with_scope(scope);
        let registry = registry.with(tracing_opentelemetry::MetricsLayer::new(
            meter_provider.clone(),
        ));
        (registry, PipelineMetrics::from_meter(&meter))
    };

    #[cfg(not(feature = "metrics"))]
    let metrics = PipelineMetrics::default();

    registry.try_init()?;

    Ok(TelemetryProviders {
        #[cfg(feature = "otel")]
        tracer_provider,
        #[cfg(feature = "metrics")]
        meter_provider,
        metrics,
    })
}

#[cfg(all(feature = "otlp", any(feature = "metrics", feature = "otel")))]
fn otlp_endpoint() -> anyhow::Result<String> {
    use anyhow::Context;

    std::env::var("OTLP_ENDPOINT").context("missing `OTLP_ENDPOINT`")
}

#[cfg(any(feature = "metrics", feature = "otel"))]
fn resource() -> Resource {
    Resource::builder()
        .with_service_name("conveyor")
        .with_schema_url(
            [KeyValue::new(
                semvcns::resource::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            )],
            semvcns::SCHEMA_URL,
        )
        .build()
}

#[cfg(feature = "metrics")]
fn init_metrics() -> anyhow::Result<sdkmetrics::SdkMeterProvider> {
    let builder = sdkmetrics::SdkMeterProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = {
        use opentelemetry_stdout::MetricExporter;
        let exporter = MetricExporter::default();
        let reader = opentelemetry_sdk::metrics::PeriodicReader::builder(exporter)
            .with_interval(std::time::Duration::from_secs(5))
            .build();

        builder.with_reader(reader)
    };

    #[cfg(feature = "otlp")]
    let builder = {
        use anyhow::Context;

        let exporter = opentelemetry_otlp::MetricExporter::builder()
            .with_tonic()
            .with_timeout(std::time::Duration::from_secs(10))
            .with_endpoint(otlp_endpoint()?)
            .with_protocol(Protocol::Grpc)
            .with_temporality(Temporality::Delta)
            .build()
            .context("failed to build metrics exporter")?;

        builder.with_periodic_exporter(exporter)
    };

    Ok(builder.build())
}

#[cfg(feature = "otel")]
fn init_tracer() -> anyhow::Result<sdktrace::SdkTracerProvider> {
    let builder = sdktrace::SdkTracerProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = {
        use opentelemetry_stdout::SpanExporter;
        let exporter = SpanExporter::default();
        let batch = sdktrace::BatchSpanProcessor::builder(exporter)
            .with_batch_config(
                sdktrace::BatchConfigBuilder::default()
                    .with_scheduled_delay(std::time::Duration::from_secs(5))
                    .with_max_queue_size(2048)
                    .build(),
            )
            .build();
        builder.with_span_processor(batch)
    };

    #[cfg(feature = "otlp")]
    let builder = {
        use anyhow::Context;

        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_timeout(std::time::Duration::from_secs(10))
            .with_endpoint(otlp_endpoint()?)
            .with_protocol(Protocol::Grpc)
            .build()
            .context("failed to build tracer exporter")?;

        let batch = sdktrace::BatchSpanProcessor::builder(exporter)
            .with_batch_config(
                sdktrace::BatchConfigBuilder::default()
                    .with_scheduled_delay(std::time::Duration::from_secs(5))
                    .with_max_queue_size(2048)
                    .build(),
            )
            .build();

        builder.with_span_processor(batch)
    };

    Ok(builder.build())
}

#[cfg(feature = "metrics")]
struct MetricHandles {
    orders_generated: Counter<u64>,
    orders_processed: Counter<u64>,
    order_failures: Counter<u64>,
    workers_active: UpDownCounter<i64>,
    process_duration_ms: Histogram<f64>,
}

/// Cloneable handle to the pipeline's instruments.
///
/// The default handle records nothing, which is also what tests use.
#[derive(Clone, Default)]
pub struct PipelineMetrics {
    #[cfg(feature = "metrics")]
    handles: Option<Arc<MetricHandles>>,
}

impl core::fmt::Debug for PipelineMetrics {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        #[cfg(feature = "metrics")]
        let enabled = self.handles.is_some();
        #[cfg(not(feature = "metrics"))]
        let enabled = false;

        f.debug_struct("PipelineMetrics")
            .field("enabled", &enabled)
            .finish()
    }
}

#[cfg(feature = "metrics")]
impl PipelineMetrics {
    pub fn from_meter(meter: &Meter) -> Self {
        let handles = MetricHandles {
            orders_generated: meter
                .u64_counter("orders_generated")
                .with_description("Orders accepted by the shared channel")
                .build(),
            orders_processed: meter
                .u64_counter("orders_processed")
                .with_description("Orders processed successfully")
                .build(),
            order_failures: meter
                .u64_counter("order_failures")
                .with_description("Orders whose processing failed")
                .build(),
            workers_active: meter
                .i64_up_down_counter("workers_active")
                .with_description("Running worker tasks")
                .build(),
            process_duration_ms: meter
                .f64_histogram("process_duration")
                .with_unit("ms")
                .with_description("Time spent in the order processor")
                .build(),
        };

        Self {
            handles: Some(Arc::new(handles)),
        }
    }

    pub fn increment_orders_generated(&self) {
        if let Some(handles) = &self.handles {
            handles.orders_generated.add(1, &[]);
        }
    }

    pub fn increment_orders_processed(&self) {
        if let Some(handles) = &self.handles {
            handles.orders_processed.add(1, &[]);
        }
    }

    pub fn increment_order_failures(&self) {
        if let Some(handles) = &self.handles {
            handles.order_failures.add(1, &[]);
        }
    }

    pub fn increment_workers_active(&self) {
        if let Some(handles) = &self.handles {
            handles.workers_active.add(1, &[]);
        }
    }

    pub fn decrement_workers_active(&self) {
        if let Some(handles) = &self.handles {
            handles.workers_active.add(-1, &[]);
        }
    }

    pub fn record_process_duration(&self, duration_ms: f64) {
        if let Some(handles) = &self.handles {
            handles.process_duration_ms.record(duration_ms, &[]);
        }
    }
}

// Convenience functions that compile to no-ops when metrics are disabled
#[cfg(not(feature = "metrics"))]
impl PipelineMetrics {
    pub const fn increment_orders_generated(&self) {}

    pub const fn increment_orders_processed(&self) {}

    pub const fn increment_order_failures(&self) {}

    pub const fn increment_workers_active(&self) {}

    pub const fn decrement_workers_active(&self) {}

    pub const fn record_process_duration(&self, _duration_ms: f64) {}
}
