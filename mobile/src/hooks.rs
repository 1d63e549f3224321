// Foreign platform hooks
//
// The host app (Kotlin/Swift) implements these traits on top of
// PowerManager, NotificationManager and the permission APIs. The adapters
// below present them to the core as its platform service traits.

use crate::records::{ChannelRecord, NotificationRecord};
use keepalive_core::platform::{
    ChannelSpec, NotificationService, NotificationSpec, PermissionService, PlatformError,
    PowerService, WakeLock,
};
use std::sync::Arc;

/// Error thrown by a foreign hook
#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum HookError {
    #[error("{message}")]
    Failed { message: String },
}

impl From<uniffi::UnexpectedUniFFICallbackError> for HookError {
    fn from(err: uniffi::UnexpectedUniFFICallbackError) -> Self {
        HookError::Failed {
            message: err.reason,
        }
    }
}

impl HookError {
    fn into_message(self) -> String {
        match self {
            HookError::Failed { message } => message,
        }
    }
}

#[uniffi::export(with_foreign)]
pub trait WakeLockHooks: Send + Sync {
    /// Acquire the partial wake lock named `tag`, creating it if needed
    fn acquire(&self, tag: String) -> Result<(), HookError>;
    fn release(&self, tag: String) -> Result<(), HookError>;
    fn is_held(&self, tag: String) -> bool;
}

#[uniffi::export(with_foreign)]
pub trait NotificationHooks: Send + Sync {
    fn create_channel(&self, channel: ChannelRecord) -> Result<(), HookError>;
    /// Promote the process to a foreground task with this notification
    fn post(&self, notification: NotificationRecord) -> Result<(), HookError>;
    fn cancel(&self, id: u32) -> Result<(), HookError>;
}

#[uniffi::export(with_foreign)]
pub trait PermissionHooks: Send + Sync {
    fn notifications_enabled(&self) -> Result<bool, HookError>;
    fn request_notification_permission(&self) -> Result<(), HookError>;
    fn is_ignoring_battery_optimizations(&self) -> Result<bool, HookError>;
    fn request_ignore_battery_optimizations(&self) -> Result<(), HookError>;
}

// ============================================================================
// ADAPTERS
// ============================================================================

pub(crate) struct HookPower(pub Arc<dyn WakeLockHooks>);

struct HookWakeLock {
    hooks: Arc<dyn WakeLockHooks>,
    tag: String,
}

impl WakeLock for HookWakeLock {
    fn acquire(&self) -> Result<(), PlatformError> {
        self.hooks
            .acquire(self.tag.clone())
            .map_err(|e| PlatformError::Power(e.into_message()))
    }

    fn release(&self) -> Result<(), PlatformError> {
        self.hooks
            .release(self.tag.clone())
            .map_err(|e| PlatformError::Power(e.into_message()))
    }

    fn is_held(&self) -> bool {
        self.hooks.is_held(self.tag.clone())
    }
}

impl PowerService for HookPower {
    fn new_wake_lock(&self, tag: &str) -> Result<Box<dyn WakeLock>, PlatformError> {
        Ok(Box::new(HookWakeLock {
            hooks: self.0.clone(),
            tag: tag.to_string(),
        }))
    }
}

pub(crate) struct HookNotifications(pub Arc<dyn NotificationHooks>);

impl NotificationService for HookNotifications {
    fn create_channel(&self, channel: &ChannelSpec) -> Result<(), PlatformError> {
        self.0
            .create_channel(channel.into())
            .map_err(|e| PlatformError::Notification(e.into_message()))
    }

    fn post(&self, notification: &NotificationSpec) -> Result<(), PlatformError> {
        self.0
            .post(notification.into())
            .map_err(|e| PlatformError::Notification(e.into_message()))
    }

    fn cancel(&self, id: u32) -> Result<(), PlatformError> {
        self.0
            .cancel(id)
            .map_err(|e| PlatformError::Notification(e.into_message()))
    }
}

pub(crate) struct HookPermissions(pub Arc<dyn PermissionHooks>);

impl PermissionService for HookPermissions {
    fn notifications_enabled(&self) -> Result<bool, PlatformError> {
        self.0
            .notifications_enabled()
            .map_err(|e| PlatformError::Permission(e.into_message()))
    }

    fn request_notification_permission(&self) -> Result<(), PlatformError> {
        self.0
            .request_notification_permission()
            .map_err(|e| PlatformError::Permission(e.into_message()))
    }

    fn is_ignoring_battery_optimizations(&self) -> Result<bool, PlatformError> {
        self.0
            .is_ignoring_battery_optimizations()
            .map_err(|e| PlatformError::Settings(e.into_message()))
    }

    fn request_ignore_battery_optimizations(&self) -> Result<(), PlatformError> {
        self.0
            .request_ignore_battery_optimizations()
            .map_err(|e| PlatformError::Settings(e.into_message()))
    }
}
