//! Logging configuration module
//! Console output plus an optional rolling JSON file

use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset (trace, debug, info, warn, error)
    pub level: String,
    /// Emit console output as JSON
    pub json: bool,
    /// Directory for rolling log files; no file output when unset
    pub log_dir: Option<PathBuf>,
    pub rotation: LogRotation,
}

/// Log rotation policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Hourly,
    Daily,
    Never,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            log_dir: None,
            rotation: LogRotation::Daily,
        }
    }
}

impl LoggingConfig {
    /// Initialize the global subscriber
    ///
    /// The returned guard flushes the file writer and must be held for the
    /// lifetime of the process.
    pub fn init(&self) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error>> {
        let env_filter =
            EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&self.level))?;

        let console_layer = if self.json {
            fmt::layer()
                .with_target(true)
                .json()
                .with_writer(io::stdout)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_ansi(true)
                .with_writer(io::stdout)
                .boxed()
        };

        let (file_layer, guard) = match &self.log_dir {
            Some(dir) => {
                let appender = match self.rotation {
                    LogRotation::Hourly => rolling::hourly(dir, "ageplane-api.log"),
                    LogRotation::Daily => rolling::daily(dir, "ageplane-api.log"),
                    LogRotation::Never => rolling::never(dir, "ageplane-api.log"),
                };
                let (writer, guard) = non_blocking(appender);
                let layer = fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_ansi(false)
                    .json()
                    .with_writer(writer)
                    .boxed();
                (Some(layer), Some(guard))
            }
            None => (None, None),
        };

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .try_init()?;

        tracing::info!(level = %self.level, json = self.json, "Logging initialized");

        Ok(guard)
    }
}
