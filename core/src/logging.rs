//! Tracing setup shared by the mobile bridge and the CLI

use crate::error::ConfigError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

// The non-blocking file writer stops flushing once its guard is dropped.
static FILE_GUARD: Mutex<Option<WorkerGuard>> = Mutex::new(None);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable text
    pub json: bool,
    /// Also write daily-rotated log files here
    pub directory: Option<PathBuf>,
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            directory: None,
            file_prefix: "keepalive.log".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        EnvFilter::try_new(&self.level)
            .map(|_| ())
            .map_err(|_| ConfigError::InvalidLogLevel(self.level.clone()))
    }
}

/// Install the global subscriber.
///
/// Returns `Ok(false)` when a subscriber was already installed, which makes
/// repeated calls (activity recreation, tests) harmless.
pub fn init(config: &LoggingConfig) -> Result<bool, ConfigError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|_| ConfigError::InvalidLogLevel(config.level.clone()))?;

    let mut layers = Vec::new();

    let console = fmt::layer().with_writer(std::io::stderr).with_target(true);
    if config.json {
        layers.push(console.json().boxed());
    } else {
        layers.push(console.boxed());
    }

    let guard = match &config.directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, &config.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            layers.push(fmt::layer().with_ansi(false).with_writer(writer).boxed());
            Some(guard)
        }
        None => None,
    };

    let installed = tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .is_ok();

    if installed {
        *FILE_GUARD.lock() = guard;
        tracing::debug!(level = %config.level, json = config.json, "logging initialized");
    }

    Ok(installed)
}
