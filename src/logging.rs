//! Logging initialization for the field device service
//!
//! Console output with env-filter, plus an optional rolling file appender.
//! Returns a guard that must be kept alive for file logging to work.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

use crate::error::{ErrorExt, Result};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level filter (trace, debug, info, warn, error) or full env-filter directive
    pub level: String,
    /// Enable console output
    pub console: bool,
    /// Optional log file path; parent directories are created on demand
    pub file: Option<String>,
    /// Enable ANSI colors in console output
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console: true,
            file: None,
            ansi: true,
        }
    }
}

fn make_filter(level: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .config_error("Invalid log filter")
}

/// Initialize logging with the given configuration
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let mut layers = Vec::new();
    let mut guard = None;

    if config.console {
        let layer = fmt::layer()
            .compact()
            .with_ansi(config.ansi)
            .with_target(true)
            .with_filter(make_filter(&config.level)?)
            .boxed();
        layers.push(layer);
    }

    if let Some(file_path) = &config.file {
        let path = Path::new(file_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).config_error("Create log directory")?;
        }

        let file_appender = tracing_appender::rolling::daily(
            path.parent().unwrap_or_else(|| Path::new(".")),
            path.file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("fieldsrv.log"),
        );
        let (non_blocking, file_guard) = tracing_appender::non_blocking(file_appender);
        guard = Some(file_guard);

        let layer = fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .with_filter(make_filter(&config.level)?)
            .boxed();
        layers.push(layer);
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .config_error("Failed to initialize logging")?;

    Ok(guard)
}
