//! Logging and tracing setup

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer, Registry};

use crate::config::LoggingConfig;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Initialize logging and tracing.
///
/// The returned guard flushes the log file on drop; keep it alive for the life of the process.
pub fn initialize_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let mut layers: Vec<BoxedLayer> = vec![stdout_layer(&config.format)];

    let guard = if config.file_output {
        std::fs::create_dir_all(&config.directory)
            .with_context(|| format!("Failed to create log directory: {:?}", config.directory))?;
        let appender = tracing_appender::rolling::daily(&config.directory, &config.file_prefix);
        let (writer, guard) = tracing_appender::non_blocking(appender);

        layers.push(
            fmt::layer()
                .json()
                .with_writer(writer)
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(false)
                .boxed(),
        );
        Some(guard)
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

fn stdout_layer(format: &str) -> BoxedLayer {
    match format {
        "json" => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        _ => fmt::layer()
            .pretty()
            .with_target(false)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(true)
            .boxed(),
    }
}
