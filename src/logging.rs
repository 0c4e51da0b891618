//! Structured logging setup
//!
//! Builds the global `tracing` subscriber from [`LoggingConfig`]:
//! - `console`, `file` (daily rolling) or `both`
//! - `pretty` for development, `json` for collection
//! - `RUST_LOG` takes precedence over the configured level
//!
//! When a file sink is active the returned [`WorkerGuard`] must be held until
//! exit, otherwise buffered lines are lost.

use crate::config::LoggingConfig;
use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

pub const LOG_FILE_NAME: &str = "llm-usage.log";

pub fn init_logging(config: &LoggingConfig, log_dir: &Path) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .with_context(|| format!("Invalid log level: {}", config.level))?;

    match config.output.as_str() {
        "file" => init_file_logging(filter, &config.format, log_dir).map(Some),
        "both" => init_combined_logging(filter, &config.format, log_dir).map(Some),
        _ => {
            init_console_logging(filter, &config.format)?;
            Ok(None)
        }
    }
}

fn init_console_logging(filter: EnvFilter, format: &str) -> Result<()> {
    let subscriber = tracing_subscriber::registry().with(filter);

    // Diagnostics go to stderr so `--json` output on stdout stays parseable.
    let installed = match format {
        "json" => subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(true)
                    .with_target(true),
            )
            .try_init(),
        _ => subscriber
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init(),
    };
    installed.context("Failed to install log subscriber")
}

fn file_writer(log_dir: &Path) -> Result<(NonBlocking, WorkerGuard)> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;
    let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_NAME);
    Ok(tracing_appender::non_blocking(appender))
}

fn init_file_logging(filter: EnvFilter, format: &str, log_dir: &Path) -> Result<WorkerGuard> {
    let (writer, guard) = file_writer(log_dir)?;
    let subscriber = tracing_subscriber::registry().with(filter);

    let installed = match format {
        "json" => subscriber
            .with(fmt::layer().json().with_writer(writer).with_current_span(true))
            .try_init(),
        _ => subscriber
            .with(fmt::layer().with_writer(writer).with_ansi(false))
            .try_init(),
    };
    installed.context("Failed to install log subscriber")?;

    Ok(guard)
}

fn init_combined_logging(filter: EnvFilter, format: &str, log_dir: &Path) -> Result<WorkerGuard> {
    let (writer, guard) = file_writer(log_dir)?;
    let subscriber = tracing_subscriber::registry().with(filter);

    let installed = match format {
        "json" => subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(fmt::layer().json().with_writer(writer))
            .try_init(),
        _ => subscriber
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(fmt::layer().with_ansi(false).with_writer(writer))
            .try_init(),
    };
    installed.context("Failed to install log subscriber")?;

    Ok(guard)
}
