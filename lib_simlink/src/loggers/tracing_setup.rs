use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("I/O error occurred: {0}")]
    IoError(#[from] io::Error),

    #[error("Invalid log filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("A global tracing subscriber is already installed: {0}")]
    AlreadyInitialized(String),
}

/// # Log Options
///
/// Where and how verbosely to log.
#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Filter used when `RUST_LOG` is not set (e.g. `info`, `lib_simlink=debug`).
    pub level: String,
    /// Directory for the daily rotating JSON log files.
    pub log_dir: PathBuf,
    /// File name prefix; the appender adds the date.
    pub file_prefix: String,
    /// Also print human-readable lines to stdout.
    pub console: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: PathBuf::from("logs"),
            file_prefix: "simbridge".to_string(),
            console: true,
        }
    }
}

/// # Setup Logging
///
/// Installs the global `tracing` subscriber:
/// - the filter comes from `RUST_LOG`, falling back to `options.level`;
/// - console lines are human-readable with ANSI colors and targets;
/// - file lines are JSON, written by a non-blocking daily rolling appender.
///
/// The returned guard flushes the file writer when dropped; keep it alive for
/// the life of the process.
pub fn setup_logging(options: &LogOptions) -> Result<WorkerGuard, LoggingError> {
    std::fs::create_dir_all(&options.log_dir)?;

    let file_appender = rolling::daily(&options.log_dir, &options.file_prefix);
    let (non_blocking_appender, guard) = non_blocking(file_appender);

    let console_layer = options
        .console
        .then(|| fmt::layer().with_target(true).with_ansi(true));

    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(non_blocking_appender)
        .json();

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&options.level))
        .map_err(|e| LoggingError::InvalidFilter {
            filter: options.level.clone(),
            reason: e.to_string(),
        })?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    info!(level = %options.level, log_dir = %options.log_dir.display(), "Logging initialized");
    Ok(guard)
}
