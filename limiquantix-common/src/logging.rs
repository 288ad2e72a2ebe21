//! Logging initialization using tracing.

use std::str::FromStr;

use anyhow::{anyhow, Result};
use tracing_subscriber::{
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable output for terminals.
    #[default]
    Pretty,
    /// One JSON object per line, for log aggregation.
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(anyhow!("Unknown log format: {}", other)),
        }
    }
}

/// Build the level filter. `RUST_LOG` wins over the supplied level.
fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level))
}

/// Initialize the tracing subscriber with the specified log level.
///
/// # Arguments
/// * `level` - Log level string (trace, debug, info, warn, error)
pub fn init_logging(level: &str) -> Result<()> {
    tracing_subscriber::registry()
        .with(env_filter(level))
        .with(
            fmt::layer()
                .with_timer(fmt::time::ChronoLocal::rfc_3339())
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_writer(std::io::stderr)
        )
        .try_init()
        .map_err(|e| anyhow!("Failed to install log subscriber: {}", e))
}

/// Initialize logging with JSON output format.
/// Suitable for production environments with log aggregation.
pub fn init_logging_json(level: &str) -> Result<()> {
    tracing_subscriber::registry()
        .with(env_filter(level))
        .with(
            fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_writer(std::io::stderr)
        )
        .try_init()
        .map_err(|e| anyhow!("Failed to install log subscriber: {}", e))
}

/// Initialize logging in the given format.
pub fn init_logging_with_format(level: &str, format: LogFormat) -> Result<()> {
    match format {
        LogFormat::Pretty => init_logging(level),
        LogFormat::Json => init_logging_json(level),
    }
}
