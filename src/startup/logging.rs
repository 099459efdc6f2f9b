//! Logging initialization.
//!
//! Console output plus an optional daily-rolling `pipehub.log` file.
//! `RUST_LOG` controls filtering for both layers; `PIPEHUB_LOG_DIR`
//! enables file logging.

use std::path::PathBuf;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

/// Logging configuration for the entire application.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log file directory; `None` disables file logging
    pub log_dir: Option<PathBuf>,
    /// Default level when `RUST_LOG` is unset
    pub level: Level,
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        let log_dir = std::env::var("PIPEHUB_LOG_DIR").ok().map(PathBuf::from);
        let level = std::env::var("PIPEHUB_LOG_LEVEL")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(Level::INFO);

        Self { log_dir, level }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            level: Level::INFO,
        }
    }
}

/// Keeps the file appender worker alive; buffered output is flushed when
/// this is dropped.
pub struct LoggingGuard {
    _file_guards: Vec<WorkerGuard>,
}

pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<LoggingGuard> {
    let mut guards: Vec<WorkerGuard> = Vec::new();
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_string()));
    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_filter(console_filter);
    layers.push(Box::new(console_layer));

    if let Some(log_dir) = &config.log_dir {
        std::fs::create_dir_all(log_dir)?;

        let appender = RollingFileAppender::new(Rotation::DAILY, log_dir, "pipehub.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        guards.push(guard);

        let file_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.level.to_string()));
        let file_layer = fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_ansi(false)
            .with_filter(file_filter);
        layers.push(Box::new(file_layer));
    }

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(LoggingGuard {
        _file_guards: guards,
    })
}
