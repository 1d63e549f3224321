//! Platform collaborator interfaces
//!
//! The OS services the lifecycle manager drives: power management (wake
//! locks), the notification service and the permission/settings subsystem.
//! Native code (Android/iOS via the mobile bridge, or the in-process
//! [`HostPlatform`]) implements these traits. Every call returns a
//! `Result` so that a platform exception is a value, never an unwind.

pub mod host;

pub use host::{HostCallCounts, HostOp, HostPlatform};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// A platform call threw
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlatformError {
    #[error("Power service error: {0}")]
    Power(String),

    #[error("Notification service error: {0}")]
    Notification(String),

    #[error("Permission subsystem error: {0}")]
    Permission(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

// ============================================================================
// CAPABILITIES
// ============================================================================

/// Android SDK level that introduced the runtime POST_NOTIFICATIONS permission
pub const SDK_RUNTIME_NOTIFICATION_PERMISSION: u32 = 33;

/// Android SDK level that introduced battery-optimization exemptions
pub const SDK_BATTERY_OPTIMIZATIONS: u32 = 23;

/// Version-dependent policy consulted by the permission gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformCapabilities {
    /// Notifications require a runtime grant from the user
    pub runtime_notification_permission: bool,
    /// The OS can throttle background work unless the app is exempted
    pub battery_optimizations: bool,
}

impl PlatformCapabilities {
    /// Capabilities for a given Android SDK level
    pub fn android(sdk_int: u32) -> Self {
        Self {
            runtime_notification_permission: sdk_int >= SDK_RUNTIME_NOTIFICATION_PERMISSION,
            battery_optimizations: sdk_int >= SDK_BATTERY_OPTIMIZATIONS,
        }
    }

    /// Platforms with neither concept
    pub fn legacy() -> Self {
        Self {
            runtime_notification_permission: false,
            battery_optimizations: false,
        }
    }

    /// Desktop hosts: permission prompt simulated, no power throttling
    pub fn desktop() -> Self {
        Self {
            runtime_notification_permission: true,
            battery_optimizations: false,
        }
    }
}

// ============================================================================
// NOTIFICATION TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Importance {
    Min,
    Low,
    Default,
    High,
}

impl Default for Importance {
    fn default() -> Self {
        Self::Low
    }
}

/// Notification channel the persistent notification is posted under
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSpec {
    pub id: String,
    pub name: String,
    pub description: String,
    pub importance: Importance,
    pub show_badge: bool,
}

/// The persistent "running" notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSpec {
    pub id: u32,
    pub channel_id: String,
    pub title: String,
    pub text: String,
    /// Non-dismissible by the user
    pub ongoing: bool,
    /// UI destination opened when the notification is tapped
    pub tap_target: String,
}

// ============================================================================
// SERVICE TRAITS
// ============================================================================

/// A named partial wake lock owned by the platform
#[cfg_attr(test, mockall::automock)]
pub trait WakeLock: Send + Sync {
    fn acquire(&self) -> Result<(), PlatformError>;
    fn release(&self) -> Result<(), PlatformError>;
    /// What the OS believes; may turn false without a release (timeouts)
    fn is_held(&self) -> bool;
}

/// OS power-management service
#[cfg_attr(test, mockall::automock)]
pub trait PowerService: Send + Sync {
    fn new_wake_lock(&self, tag: &str) -> Result<Box<dyn WakeLock>, PlatformError>;
}

/// OS notification service
#[cfg_attr(test, mockall::automock)]
pub trait NotificationService: Send + Sync {
    fn create_channel(&self, channel: &ChannelSpec) -> Result<(), PlatformError>;
    fn post(&self, notification: &NotificationSpec) -> Result<(), PlatformError>;
    fn cancel(&self, id: u32) -> Result<(), PlatformError>;
}

/// OS permission and settings subsystem
#[cfg_attr(test, mockall::automock)]
pub trait PermissionService: Send + Sync {
    fn notifications_enabled(&self) -> Result<bool, PlatformError>;
    /// Raise the permission prompt; the answer arrives later, out-of-band
    fn request_notification_permission(&self) -> Result<(), PlatformError>;
    fn is_ignoring_battery_optimizations(&self) -> Result<bool, PlatformError>;
    /// Open the exemption settings screen; fire-and-forget
    fn request_ignore_battery_optimizations(&self) -> Result<(), PlatformError>;
}

/// The full set of collaborators a lifecycle manager is built from
#[derive(Clone)]
pub struct PlatformServices {
    pub power: Arc<dyn PowerService>,
    pub notifications: Arc<dyn NotificationService>,
    pub permissions: Arc<dyn PermissionService>,
    pub capabilities: PlatformCapabilities,
}

impl PlatformServices {
    /// Every service backed by the same in-process host
    pub fn host(host: &HostPlatform, capabilities: PlatformCapabilities) -> Self {
        Self {
            power: Arc::new(host.clone()),
            notifications: Arc::new(host.clone()),
            permissions: Arc::new(host.clone()),
            capabilities,
        }
    }
}
