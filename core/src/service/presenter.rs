//! Notification presenter
//!
//! Owns the notification channel and the single persistent notification
//! that marks the task as a user-visible background task.

use crate::platform::{ChannelSpec, NotificationService, NotificationSpec, PlatformError};
use std::sync::Arc;

pub struct NotificationPresenter {
    service: Arc<dyn NotificationService>,
    channel: ChannelSpec,
    notification: NotificationSpec,
    channel_ready: bool,
    posted: bool,
}

impl NotificationPresenter {
    pub fn new(
        service: Arc<dyn NotificationService>,
        channel: ChannelSpec,
        notification: NotificationSpec,
    ) -> Self {
        Self {
            service,
            channel,
            notification,
            channel_ready: false,
            posted: false,
        }
    }

    /// Create the channel once; later calls are no-ops.
    ///
    /// A failure is logged and left for the next call to retry. The OS call
    /// is itself idempotent, so a retry is always safe.
    pub fn ensure_channel(&mut self) {
        if self.channel_ready {
            return;
        }
        match self.service.create_channel(&self.channel) {
            Ok(()) => {
                self.channel_ready = true;
                tracing::debug!(channel = %self.channel.id, "notification channel created");
            }
            Err(e) => {
                tracing::warn!(channel = %self.channel.id, "failed to create notification channel: {}", e);
            }
        }
    }

    /// Show (or refresh) the persistent notification
    pub fn post(&mut self) -> Result<(), PlatformError> {
        self.service.post(&self.notification)?;
        self.posted = true;
        tracing::debug!(id = self.notification.id, "persistent notification posted");
        Ok(())
    }

    /// Remove the persistent notification; failures are logged only
    pub fn withdraw(&mut self) {
        if !self.posted {
            return;
        }
        self.posted = false;
        if let Err(e) = self.service.cancel(self.notification.id) {
            tracing::warn!(id = self.notification.id, "failed to withdraw notification: {}", e);
        }
    }

    pub fn is_posted(&self) -> bool {
        self.posted
    }

    pub fn channel_ready(&self) -> bool {
        self.channel_ready
    }
}
