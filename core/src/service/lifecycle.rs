//! Background keep-alive lifecycle manager
//!
//! The state machine that decides when the wake lock and the persistent
//! notification may be taken, held or released. All transitions take
//! `&mut self`, so they are serialized by construction; the command channel
//! owns the single instance and feeds it one request at a time.
//!
//! ```text
//!   Idle --StartTask--> Starting --(channel, post, acquire)--> Running
//!     ^                    |                                      |
//!     +----- rollback -----+           Running --StopTask--> Stopping --> Idle
//! ```

use super::guard::ResourceGuard;
use super::permission::{PermissionGate, PermissionStatus};
use super::presenter::NotificationPresenter;
use crate::config::KeepAliveConfig;
use crate::error::{CommandError, ConfigError, ErrorKind};
use crate::platform::PlatformServices;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// STATE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceState {
    Idle,
    Starting,
    Running,
    Stopping,
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Starting => write!(f, "Starting"),
            Self::Running => write!(f, "Running"),
            Self::Stopping => write!(f, "Stopping"),
        }
    }
}

/// Point-in-time view of the manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub state: ServiceState,
    pub wake_lock_held: bool,
    pub notification_posted: bool,
    /// `None` when the permission subsystem could not be queried
    pub permissions: Option<PermissionStatus>,
    pub running_since: Option<DateTime<Utc>>,
    pub uptime_secs: u64,
    pub starts: u64,
    pub stops: u64,
}

// ============================================================================
// MANAGER
// ============================================================================

pub struct LifecycleManager {
    state: ServiceState,
    guard: ResourceGuard,
    presenter: NotificationPresenter,
    gate: PermissionGate,
    auto_start_on_grant: bool,
    running_since: Option<DateTime<Utc>>,
    starts: u64,
    stops: u64,
}

impl LifecycleManager {
    pub fn new(config: &KeepAliveConfig, platform: PlatformServices) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            state: ServiceState::Idle,
            guard: ResourceGuard::new(platform.power, config.wake_lock_tag.clone()),
            presenter: NotificationPresenter::new(
                platform.notifications,
                config.channel.clone(),
                config.notification_spec(),
            ),
            gate: PermissionGate::new(platform.permissions, platform.capabilities),
            auto_start_on_grant: config.auto_start_on_grant,
            running_since: None,
            starts: 0,
            stops: 0,
        })
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ServiceState::Running
    }

    pub fn is_wake_lock_held(&self) -> bool {
        self.guard.is_held()
    }

    pub fn is_notification_posted(&self) -> bool {
        self.presenter.is_posted()
    }

    fn transition(&mut self, next: ServiceState, reason: &str) {
        tracing::info!(from = %self.state, to = %next, reason, "service state transition");
        self.state = next;
    }

    // ------------------------------------------------------------------------
    // TASK LIFECYCLE
    // ------------------------------------------------------------------------

    /// Start the background task.
    ///
    /// A no-op success while already starting or running. Fails with
    /// `PermissionDenied` without leaving `Idle` when notifications are not
    /// permitted; any failure after that point is rolled back to `Idle`.
    pub fn start_task(&mut self) -> Result<bool, CommandError> {
        if matches!(self.state, ServiceState::Starting | ServiceState::Running) {
            tracing::debug!(state = %self.state, "start ignored, task already active");
            return Ok(true);
        }

        let permitted = self.gate.check_notification_permission().map_err(|e| {
            CommandError::from_platform(
                ErrorKind::ServiceStartFailure,
                "Failed to check notification permission",
                &e,
            )
        })?;
        if !permitted {
            tracing::warn!("start refused: notification permission not granted");
            return Err(CommandError::permission_denied());
        }

        self.transition(ServiceState::Starting, "start requested");

        match self.bring_up() {
            Ok(()) => {
                self.transition(ServiceState::Running, "resources acquired");
                self.running_since = Some(Utc::now());
                self.starts += 1;
                Ok(true)
            }
            Err(err) => {
                tracing::error!("start failed, rolling back: {}", err);
                self.release_resources();
                self.transition(ServiceState::Idle, "start rolled back");
                Err(err)
            }
        }
    }

    // The notification goes up before the lock: platforms that require a
    // visible notification for background work would kill us otherwise.
    fn bring_up(&mut self) -> Result<(), CommandError> {
        self.presenter.ensure_channel();
        self.presenter.post().map_err(|e| {
            CommandError::from_platform(
                ErrorKind::ServiceStartFailure,
                "Failed to start service",
                &e,
            )
        })?;
        self.guard.acquire().map_err(|e| {
            CommandError::from_platform(
                ErrorKind::ServiceStartFailure,
                "Failed to acquire wake lock",
                &e,
            )
        })?;
        Ok(())
    }

    /// Stop the background task. Always succeeds; release is best-effort.
    pub fn stop_task(&mut self) -> Result<bool, CommandError> {
        if self.state == ServiceState::Idle {
            tracing::debug!("stop ignored, task not running");
            return Ok(true);
        }

        self.transition(ServiceState::Stopping, "stop requested");
        self.release_resources();
        self.finish_stop("stopped");
        Ok(true)
    }

    /// Forced release from any state, used on process teardown
    pub fn teardown(&mut self) {
        self.release_resources();
        if self.state != ServiceState::Idle {
            self.finish_stop("process teardown");
        }
    }

    fn finish_stop(&mut self, reason: &str) {
        self.transition(ServiceState::Idle, reason);
        self.running_since = None;
        self.stops += 1;
    }

    fn release_resources(&mut self) {
        self.presenter.withdraw();
        if let Err(e) = self.guard.release() {
            tracing::warn!(tag = %self.guard.tag(), "wake lock release failed: {}", e);
        }
    }

    /// OS callback for the notification permission prompt
    ///
    /// Returns whether the task was started as a consequence.
    pub fn on_permission_result(&mut self, granted: bool) -> Result<bool, CommandError> {
        tracing::info!(granted, "notification permission result");
        if !granted || !self.auto_start_on_grant {
            return Ok(false);
        }
        self.start_task()
    }

    // ------------------------------------------------------------------------
    // PERMISSIONS
    // ------------------------------------------------------------------------

    pub fn check_notification_permission(&self) -> Result<bool, CommandError> {
        self.gate.check_notification_permission().map_err(|e| {
            CommandError::from_platform(
                ErrorKind::PermissionError,
                "Failed to check notification permission",
                &e,
            )
        })
    }

    /// Fire-and-forget; the UI re-queries once it regains focus
    pub fn request_notification_permission(&self) -> Result<bool, CommandError> {
        self.gate.request_notification_permission().map_err(|e| {
            CommandError::from_platform(
                ErrorKind::PermissionError,
                "Failed to request notification permission",
                &e,
            )
        })?;
        Ok(true)
    }

    pub fn check_battery_exemption(&self) -> Result<bool, CommandError> {
        self.gate.check_battery_exemption().map_err(|e| {
            CommandError::from_platform(
                ErrorKind::PermissionError,
                "Failed to check battery optimization",
                &e,
            )
        })
    }

    pub fn request_battery_exemption(&self) -> Result<bool, CommandError> {
        self.gate.request_battery_exemption().map_err(|e| {
            CommandError::from_platform(
                ErrorKind::BatteryExemptionRequestFailure,
                "Failed to request battery optimization",
                &e,
            )
        })?;
        Ok(true)
    }

    pub fn status(&self) -> ServiceStatus {
        let permissions = match self.gate.status() {
            Ok(status) => Some(status),
            Err(e) => {
                tracing::warn!("permission status unavailable: {}", e);
                None
            }
        };
        let uptime_secs = self
            .running_since
            .map(|since| (Utc::now() - since).num_seconds().max(0) as u64)
            .unwrap_or(0);

        ServiceStatus {
            state: self.state,
            wake_lock_held: self.guard.is_held(),
            notification_posted: self.presenter.is_posted(),
            permissions,
            running_since: self.running_since,
            uptime_secs,
            starts: self.starts,
            stops: self.stops,
        }
    }
}

impl Drop for LifecycleManager {
    fn drop(&mut self) {
        if self.guard.is_held() || self.presenter.is_posted() {
            tracing::warn!("lifecycle manager dropped while active, releasing");
            self.teardown();
        }
    }
}
