//! Boundary error types
//!
//! Everything that crosses the Command Channel back to the UI layer is a
//! `CommandError { kind, message }`. Platform and transport failures are
//! converted into one of these before they leave the channel.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::platform::PlatformError;

/// Error taxonomy surfaced to callers of the Command Channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Notification permission not granted; the UI should prompt the user
    PermissionDenied,
    /// A permission query or request call threw
    PermissionError,
    /// Generic service failure (transport closed, handler aborted)
    ServiceError,
    /// The start sequence failed and was rolled back
    ServiceStartFailure,
    /// The stop sequence failed (rare, release is best-effort)
    ServiceStopFailure,
    /// Acquiring or releasing the wake lock threw
    WakelockError,
    /// Opening the battery-optimization settings failed
    BatteryExemptionRequestFailure,
    /// Unknown command tag
    NotImplemented,
}

impl ErrorKind {
    /// Wire code, identical to the serde representation
    pub fn code(&self) -> &'static str {
        match self {
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::PermissionError => "PERMISSION_ERROR",
            Self::ServiceError => "SERVICE_ERROR",
            Self::ServiceStartFailure => "SERVICE_START_FAILURE",
            Self::ServiceStopFailure => "SERVICE_STOP_FAILURE",
            Self::WakelockError => "WAKELOCK_ERROR",
            Self::BatteryExemptionRequestFailure => "BATTERY_EXEMPTION_REQUEST_FAILURE",
            Self::NotImplemented => "NOT_IMPLEMENTED",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Structured error returned for a failed command
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct CommandError {
    pub kind: ErrorKind,
    pub message: String,
}

impl CommandError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn permission_denied() -> Self {
        Self::new(
            ErrorKind::PermissionDenied,
            "Notification permission not granted",
        )
    }

    pub fn not_implemented(tag: &str) -> Self {
        Self::new(
            ErrorKind::NotImplemented,
            format!("Unknown command: {}", tag),
        )
    }

    /// Wrap a platform failure under the given kind, keeping its message
    pub fn from_platform(kind: ErrorKind, context: &str, err: &PlatformError) -> Self {
        Self::new(kind, format!("{}: {}", context, err))
    }
}

/// Errors raised by the transport between the UI and the manager task
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Lifecycle manager is not running")]
    Closed,

    #[error("Lifecycle manager dropped the reply")]
    NoReply,

    #[error("Failed to spawn lifecycle thread: {0}")]
    Spawn(String),
}

impl From<ChannelError> for CommandError {
    fn from(err: ChannelError) -> Self {
        CommandError::new(ErrorKind::ServiceError, err.to_string())
    }
}

/// Invalid configuration values
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigError {
    #[error("wake_lock_tag cannot be empty")]
    EmptyWakeLockTag,

    #[error("channel id cannot be empty")]
    EmptyChannelId,

    #[error("notification id must be non-zero")]
    ZeroNotificationId,

    #[error("queue_depth must be at least 1")]
    ZeroQueueDepth,

    #[error("Invalid log level: {0}")]
    InvalidLogLevel(String),
}

/// Failure to bring the lifecycle manager up
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeepAliveError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Channel(#[from] ChannelError),
}
