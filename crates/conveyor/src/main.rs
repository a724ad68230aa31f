//! # `conveyor`
//!
//! Runs one pipeline to completion with the configured fan-out and fan-in
//! widths, writing a line to stdout per processed order.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin conveyor --release
//! ```
//!
//! Ctrl+C or SIGTERM cancels the run; the process still exits with status 0
//! once every task has stopped.

use clap::Parser;
use conveyor::{
    CliArgs, Pipeline, PipelineConfig, pipeline::telemetry::init_telemetry, sink::StdoutSink,
};
use tokio::signal;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = PipelineConfig::try_from(args)?;

    let providers = init_telemetry()?;
    log_startup_info(&config);

    let sink = StdoutSink::stdout(config.process_delay);
    let result = Pipeline::new(config, sink)
        .with_metrics(providers.metrics.clone())
        .run_until(shutdown_signal())
        .await;

    if let Err(e) = &result {
        tracing::error!("Pipeline failed: {e}");
    } else {
        tracing::info!("Application finished successfully");
    }

    providers.shutdown();
    result?;
    Ok(())
}

fn log_startup_info(config: &PipelineConfig) {
    if cfg!(debug_assertions) {
        tracing::info!("Starting application with full config: {:#?}", config);
    } else {
        tracing::info!(
            "Starting application with {} generators and {} workers",
            config.num_generators,
            config.num_workers
        );
    }
}

/// Resolves on the first Ctrl+C or SIGTERM.
///
/// If a handler cannot be installed the error is logged and that signal is
/// simply never observed.
async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                core::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = core::future::pending::<()>();

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            core::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        () = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }

    tracing::info!("Shutdown signal received, terminating gracefully...");
}
