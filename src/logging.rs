//! Logging (§4.O): one-time process-wide `tracing` initialization. A
//! `fmt` layer always writes human-readable output to the console; when
//! `log_dir` is configured a second `tracing-appender` rolling-file layer
//! emits JSON for machine consumption.

use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

/// Holds the non-blocking file writer's guard, if a log directory was
/// configured. Dropping it flushes any buffered lines, so the caller must
/// keep it alive for the lifetime of the process.
pub struct LoggingGuard(#[allow(dead_code)] Option<WorkerGuard>);

fn filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "debug" } else { "info" })
    })
}

/// Initializes the global subscriber. Must be called exactly once, before
/// any other collaborator logs anything.
pub fn init(verbose: bool, log_dir: Option<&Path>) -> Result<LoggingGuard> {
    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(filter(verbose));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "orchestrator.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_filter(filter(verbose));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("failed to install global tracing subscriber")?;

    Ok(LoggingGuard(guard))
}
