//! Permission gate
//!
//! Answers the two preconditions of the background task: notification
//! permission and the battery-optimization exemption. Nothing is cached;
//! the user can revoke either in system settings at any time. Requests are
//! fire-and-forget and their outcome is observed by querying again.

use crate::platform::{PermissionService, PlatformCapabilities, PlatformError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Snapshot of both preconditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionStatus {
    pub notifications_enabled: bool,
    pub battery_exempt: bool,
}

pub struct PermissionGate {
    service: Arc<dyn PermissionService>,
    capabilities: PlatformCapabilities,
}

impl PermissionGate {
    pub fn new(service: Arc<dyn PermissionService>, capabilities: PlatformCapabilities) -> Self {
        Self {
            service,
            capabilities,
        }
    }

    pub fn capabilities(&self) -> PlatformCapabilities {
        self.capabilities
    }

    /// Always true on platforms without a runtime notification permission
    pub fn check_notification_permission(&self) -> Result<bool, PlatformError> {
        if !self.capabilities.runtime_notification_permission {
            return Ok(true);
        }
        self.service.notifications_enabled()
    }

    /// Raise the OS prompt if the permission is still missing
    pub fn request_notification_permission(&self) -> Result<(), PlatformError> {
        if !self.capabilities.runtime_notification_permission {
            return Ok(());
        }
        if self.service.notifications_enabled()? {
            tracing::debug!("notification permission already granted");
            return Ok(());
        }
        tracing::info!("requesting notification permission");
        self.service.request_notification_permission()
    }

    /// Always true on platforms that never throttle background work
    pub fn check_battery_exemption(&self) -> Result<bool, PlatformError> {
        if !self.capabilities.battery_optimizations {
            return Ok(true);
        }
        self.service.is_ignoring_battery_optimizations()
    }

    /// Open the exemption settings screen if the app is not yet exempt
    pub fn request_battery_exemption(&self) -> Result<(), PlatformError> {
        if !self.capabilities.battery_optimizations {
            return Ok(());
        }
        if self.service.is_ignoring_battery_optimizations()? {
            tracing::debug!("already exempt from battery optimizations");
            return Ok(());
        }
        tracing::info!("requesting battery optimization exemption");
        self.service.request_ignore_battery_optimizations()
    }

    pub fn status(&self) -> Result<PermissionStatus, PlatformError> {
        Ok(PermissionStatus {
            notifications_enabled: self.check_notification_permission()?,
            battery_exempt: self.check_battery_exemption()?,
        })
    }
}
