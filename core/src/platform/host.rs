//! In-process platform
//!
//! Implements every collaborator trait against shared in-memory state. The
//! desktop CLI runs the lifecycle manager on top of it, and tests use it to
//! observe side effects (call counts, lock and notification visibility) and
//! to inject one-shot failures.

use super::{
    ChannelSpec, NotificationService, NotificationSpec, PermissionService, PlatformError,
    PowerService, WakeLock,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Operations that can be made to fail once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostOp {
    NewWakeLock,
    Acquire,
    Release,
    CreateChannel,
    Post,
    Cancel,
    QueryPermission,
    RequestNotificationPermission,
    RequestBatteryExemption,
}

/// Number of times each platform call succeeded
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostCallCounts {
    pub wake_locks_created: u32,
    pub acquires: u32,
    pub releases: u32,
    pub channels_created: u32,
    pub posts: u32,
    pub cancels: u32,
    pub notification_prompts: u32,
    pub battery_prompts: u32,
}

#[derive(Debug, Default)]
struct HostState {
    notifications_enabled: bool,
    battery_exempt: bool,
    lock_held: bool,
    visible_notification: Option<u32>,
    channels: HashSet<String>,
    pending_failures: HashSet<HostOp>,
    counts: HostCallCounts,
}

impl HostState {
    fn take_failure(&mut self, op: HostOp) -> bool {
        self.pending_failures.remove(&op)
    }
}

/// Shared, cloneable in-memory platform
#[derive(Debug, Clone, Default)]
pub struct HostPlatform {
    state: Arc<Mutex<HostState>>,
}

impl HostPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Platform with the given permission state
    pub fn with_permissions(notifications_enabled: bool, battery_exempt: bool) -> Self {
        let host = Self::new();
        {
            let mut state = host.state.lock();
            state.notifications_enabled = notifications_enabled;
            state.battery_exempt = battery_exempt;
        }
        host
    }

    /// Simulate the user toggling notifications in settings
    pub fn set_notifications_enabled(&self, enabled: bool) {
        self.state.lock().notifications_enabled = enabled;
    }

    pub fn set_battery_exempt(&self, exempt: bool) {
        self.state.lock().battery_exempt = exempt;
    }

    /// Make the next call of `op` fail
    pub fn fail_next(&self, op: HostOp) {
        self.state.lock().pending_failures.insert(op);
    }

    pub fn lock_held(&self) -> bool {
        self.state.lock().lock_held
    }

    /// Simulate the OS dropping the wake lock on its own (timeout)
    pub fn expire_lock(&self) {
        self.state.lock().lock_held = false;
    }

    pub fn visible_notification(&self) -> Option<u32> {
        self.state.lock().visible_notification
    }

    pub fn has_channel(&self, id: &str) -> bool {
        self.state.lock().channels.contains(id)
    }

    pub fn counts(&self) -> HostCallCounts {
        self.state.lock().counts.clone()
    }

    fn fail(&self, op: HostOp) -> Option<String> {
        if self.state.lock().take_failure(op) {
            tracing::debug!(?op, "host platform injecting failure");
            Some(format!("injected failure in {:?}", op))
        } else {
            None
        }
    }
}

struct HostWakeLock {
    platform: HostPlatform,
}

impl WakeLock for HostWakeLock {
    fn acquire(&self) -> Result<(), PlatformError> {
        if let Some(msg) = self.platform.fail(HostOp::Acquire) {
            return Err(PlatformError::Power(msg));
        }
        let mut state = self.platform.state.lock();
        state.lock_held = true;
        state.counts.acquires += 1;
        Ok(())
    }

    fn release(&self) -> Result<(), PlatformError> {
        if let Some(msg) = self.platform.fail(HostOp::Release) {
            return Err(PlatformError::Power(msg));
        }
        let mut state = self.platform.state.lock();
        state.lock_held = false;
        state.counts.releases += 1;
        Ok(())
    }

    fn is_held(&self) -> bool {
        self.platform.state.lock().lock_held
    }
}

impl PowerService for HostPlatform {
    fn new_wake_lock(&self, tag: &str) -> Result<Box<dyn WakeLock>, PlatformError> {
        if let Some(msg) = self.fail(HostOp::NewWakeLock) {
            return Err(PlatformError::Power(msg));
        }
        tracing::debug!(tag, "host platform created wake lock");
        self.state.lock().counts.wake_locks_created += 1;
        Ok(Box::new(HostWakeLock {
            platform: self.clone(),
        }))
    }
}

impl NotificationService for HostPlatform {
    fn create_channel(&self, channel: &ChannelSpec) -> Result<(), PlatformError> {
        if let Some(msg) = self.fail(HostOp::CreateChannel) {
            return Err(PlatformError::Notification(msg));
        }
        let mut state = self.state.lock();
        state.channels.insert(channel.id.clone());
        state.counts.channels_created += 1;
        Ok(())
    }

    fn post(&self, notification: &NotificationSpec) -> Result<(), PlatformError> {
        if let Some(msg) = self.fail(HostOp::Post) {
            return Err(PlatformError::Notification(msg));
        }
        let mut state = self.state.lock();
        if !state.channels.contains(&notification.channel_id) {
            return Err(PlatformError::Notification(format!(
                "channel {} does not exist",
                notification.channel_id
            )));
        }
        state.visible_notification = Some(notification.id);
        state.counts.posts += 1;
        Ok(())
    }

    fn cancel(&self, id: u32) -> Result<(), PlatformError> {
        if let Some(msg) = self.fail(HostOp::Cancel) {
            return Err(PlatformError::Notification(msg));
        }
        let mut state = self.state.lock();
        if state.visible_notification == Some(id) {
            state.visible_notification = None;
        }
        state.counts.cancels += 1;
        Ok(())
    }
}

impl PermissionService for HostPlatform {
    fn notifications_enabled(&self) -> Result<bool, PlatformError> {
        if let Some(msg) = self.fail(HostOp::QueryPermission) {
            return Err(PlatformError::Permission(msg));
        }
        Ok(self.state.lock().notifications_enabled)
    }

    fn request_notification_permission(&self) -> Result<(), PlatformError> {
        if let Some(msg) = self.fail(HostOp::RequestNotificationPermission) {
            return Err(PlatformError::Permission(msg));
        }
        self.state.lock().counts.notification_prompts += 1;
        Ok(())
    }

    fn is_ignoring_battery_optimizations(&self) -> Result<bool, PlatformError> {
        Ok(self.state.lock().battery_exempt)
    }

    fn request_ignore_battery_optimizations(&self) -> Result<(), PlatformError> {
        if let Some(msg) = self.fail(HostOp::RequestBatteryExemption) {
            return Err(PlatformError::Settings(msg));
        }
        self.state.lock().counts.battery_prompts += 1;
        Ok(())
    }
}
