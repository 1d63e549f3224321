//! Keep-alive configuration
//!
//! Values the lifecycle manager needs to talk to the platform: the wake lock
//! tag, the notification channel and the persistent notification itself.
//! Defaults reproduce the camera capture service this crate was built for.

use crate::error::ConfigError;
use crate::platform::{ChannelSpec, Importance, NotificationSpec};
use serde::{Deserialize, Serialize};

pub const DEFAULT_WAKE_LOCK_TAG: &str = "RePhoneCamera:ForegroundService";
pub const DEFAULT_CHANNEL_ID: &str = "camera_service_channel";
pub const DEFAULT_NOTIFICATION_ID: u32 = 1;
pub const DEFAULT_QUEUE_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeepAliveConfig {
    /// Diagnostic identifier of the partial wake lock
    pub wake_lock_tag: String,
    pub channel: ChannelSpec,
    pub notification: NotificationSpec,
    /// Start the task as soon as the user grants notification permission
    pub auto_start_on_grant: bool,
    /// Capacity of the command queue in front of the manager
    pub queue_depth: usize,
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self {
            wake_lock_tag: DEFAULT_WAKE_LOCK_TAG.to_string(),
            channel: ChannelSpec {
                id: DEFAULT_CHANNEL_ID.to_string(),
                name: "Camera service".to_string(),
                description: "Keeps the camera capturing video in the background".to_string(),
                importance: Importance::Low,
                show_badge: false,
            },
            notification: NotificationSpec {
                id: DEFAULT_NOTIFICATION_ID,
                channel_id: DEFAULT_CHANNEL_ID.to_string(),
                title: "Camera running".to_string(),
                text: "Capturing video; monitoring requests are still received while locked"
                    .to_string(),
                ongoing: true,
                tap_target: "main".to_string(),
            },
            auto_start_on_grant: true,
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

impl KeepAliveConfig {
    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.wake_lock_tag.trim().is_empty() {
            return Err(ConfigError::EmptyWakeLockTag);
        }
        if self.channel.id.trim().is_empty() {
            return Err(ConfigError::EmptyChannelId);
        }
        // Android rejects startForeground with id 0
        if self.notification.id == 0 {
            return Err(ConfigError::ZeroNotificationId);
        }
        if self.queue_depth == 0 {
            return Err(ConfigError::ZeroQueueDepth);
        }
        Ok(())
    }

    /// Notification spec bound to the configured channel
    pub fn notification_spec(&self) -> NotificationSpec {
        NotificationSpec {
            channel_id: self.channel.id.clone(),
            ..self.notification.clone()
        }
    }
}
