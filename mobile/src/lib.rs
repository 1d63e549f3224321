// keepalive-mobile — Native bindings for Android and iOS
// Exposes the keep-alive command channel to the host app via UniFFI.

mod hooks;
mod records;

pub use hooks::{HookError, NotificationHooks, PermissionHooks, WakeLockHooks};
pub use records::{
    ChannelImportance, ChannelRecord, CommandFailure, CommandOutcome, FailureKind,
    NotificationRecord, TaskState, TaskStatus,
};

use hooks::{HookNotifications, HookPermissions, HookPower};
use keepalive_core::{
    logging, Command, CommandChannel, CommandValue, KeepAliveConfig, LifecycleEvent,
    LoggingConfig, PlatformCapabilities, PlatformServices,
};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;

uniffi::setup_scaffolding!();

// One lifecycle manager per process: the activity may be recreated many
// times but must find the same channel again.
static INSTALLED: Mutex<Option<Arc<KeepAliveBridge>>> = Mutex::new(None);

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum BridgeError {
    #[error("a keep-alive bridge is already installed")]
    AlreadyInstalled,
    #[error("invalid configuration: {message}")]
    Config { message: String },
    #[error("command channel failure: {message}")]
    Channel { message: String },
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct BridgeOptions {
    /// `Build.VERSION.SDK_INT`; 0 for platforms without runtime gates
    pub sdk_int: u32,
    pub log_level: String,
    pub log_directory: Option<String>,
    /// JSON-encoded `KeepAliveConfig`; defaults when absent
    pub config_json: Option<String>,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            sdk_int: 0,
            log_level: "info".to_string(),
            log_directory: None,
            config_json: None,
        }
    }
}

impl BridgeOptions {
    fn capabilities(&self) -> PlatformCapabilities {
        if self.sdk_int == 0 {
            PlatformCapabilities::desktop()
        } else {
            PlatformCapabilities::android(self.sdk_int)
        }
    }

    fn config(&self) -> Result<KeepAliveConfig, BridgeError> {
        let config: KeepAliveConfig = match &self.config_json {
            Some(json) => serde_json::from_str(json).map_err(|e| BridgeError::Config {
                message: e.to_string(),
            })?,
            None => KeepAliveConfig::default(),
        };
        config.validate().map_err(|e| BridgeError::Config {
            message: e.to_string(),
        })?;
        Ok(config)
    }

    fn logging(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.log_level.clone(),
            directory: self.log_directory.as_ref().map(PathBuf::from),
            ..Default::default()
        }
    }
}

// ============================================================================
// BRIDGE
// ============================================================================

#[derive(uniffi::Object)]
pub struct KeepAliveBridge {
    channel: CommandChannel,
}

impl KeepAliveBridge {
    fn build(
        options: &BridgeOptions,
        wake_locks: Arc<dyn WakeLockHooks>,
        notifications: Arc<dyn NotificationHooks>,
        permissions: Arc<dyn PermissionHooks>,
    ) -> Result<Self, BridgeError> {
        let config = options.config()?;
        let platform = PlatformServices {
            power: Arc::new(HookPower(wake_locks)),
            notifications: Arc::new(HookNotifications(notifications)),
            permissions: Arc::new(HookPermissions(permissions)),
            capabilities: options.capabilities(),
        };
        let channel = keepalive_core::spawn(&config, platform).map_err(|e| {
            BridgeError::Channel {
                message: e.to_string(),
            }
        })?;
        Ok(Self { channel })
    }

    /// The bridge installed in this process, if any
    pub fn shared() -> Option<Arc<Self>> {
        INSTALLED.lock().clone()
    }

    fn send(&self, command: Command) -> CommandOutcome {
        self.channel.send_blocking(command).into()
    }
}

#[uniffi::export]
impl KeepAliveBridge {
    /// Create the process-wide bridge. A second call while one is installed
    /// fails with `AlreadyInstalled`; use `shared_bridge()` to reach it.
    #[uniffi::constructor]
    pub fn install(
        options: BridgeOptions,
        wake_locks: Arc<dyn WakeLockHooks>,
        notifications: Arc<dyn NotificationHooks>,
        permissions: Arc<dyn PermissionHooks>,
    ) -> Result<Arc<Self>, BridgeError> {
        let mut slot = INSTALLED.lock();
        if slot.is_some() {
            return Err(BridgeError::AlreadyInstalled);
        }

        if let Err(e) = logging::init(&options.logging()) {
            // Logging is optional; the bridge works without it
            eprintln!("keepalive: logging disabled: {}", e);
        }

        let bridge = Arc::new(Self::build(
            &options,
            wake_locks,
            notifications,
            permissions,
        )?);
        *slot = Some(bridge.clone());
        tracing::info!(sdk = options.sdk_int, "keep-alive bridge installed");
        Ok(bridge)
    }

    /// Route a method-channel call by name
    pub fn dispatch(&self, method: String) -> CommandOutcome {
        self.channel.dispatch_blocking(&method).into()
    }

    pub fn start_task(&self) -> CommandOutcome {
        self.send(Command::StartTask)
    }

    pub fn stop_task(&self) -> CommandOutcome {
        self.send(Command::StopTask)
    }

    pub fn check_notification_permission(&self) -> CommandOutcome {
        self.send(Command::CheckNotificationPermission)
    }

    pub fn request_notification_permission(&self) -> CommandOutcome {
        self.send(Command::RequestNotificationPermission)
    }

    pub fn check_battery_exemption(&self) -> CommandOutcome {
        self.send(Command::CheckBatteryExemption)
    }

    pub fn request_battery_exemption(&self) -> CommandOutcome {
        self.send(Command::RequestBatteryExemption)
    }

    pub fn status(&self) -> Result<TaskStatus, BridgeError> {
        match self.channel.send_blocking(Command::GetStatus) {
            Ok(CommandValue::Status(status)) => Ok((*status).into()),
            Ok(other) => Err(BridgeError::Channel {
                message: format!("unexpected status reply: {:?}", other),
            }),
            Err(e) => Err(BridgeError::Channel {
                message: e.to_string(),
            }),
        }
    }

    /// Forward the answer to the notification permission prompt
    pub fn on_permission_result(&self, granted: bool) -> CommandOutcome {
        self.channel
            .notify_blocking(LifecycleEvent::PermissionResult { granted })
            .into()
    }

    /// The hosting activity is going away: stop and release everything
    pub fn on_activity_destroyed(&self) -> CommandOutcome {
        self.channel.teardown_blocking().into()
    }

    /// Stop the manager thread and uninstall this bridge
    pub fn shutdown(self: Arc<Self>) -> Result<(), BridgeError> {
        {
            let mut slot = INSTALLED.lock();
            if slot.as_ref().is_some_and(|b| Arc::ptr_eq(b, &self)) {
                *slot = None;
            }
        }
        self.channel.shutdown().map_err(|e| BridgeError::Channel {
            message: e.to_string(),
        })?;
        tracing::info!("keep-alive bridge shut down");
        Ok(())
    }
}

/// Reach the installed bridge from any thread or component
#[uniffi::export]
pub fn shared_bridge() -> Option<Arc<KeepAliveBridge>> {
    KeepAliveBridge::shared()
}

#[cfg(test)]
mod tests {
    use super::*;
    use keepalive_core::{
        HostPlatform, NotificationService, PermissionService, PlatformError, PowerService,
        WakeLock,
    };

    // Host app stand-in backed by the in-process platform simulation
    struct TestHost {
        platform: HostPlatform,
        lock: Mutex<Option<Box<dyn WakeLock>>>,
    }

    impl TestHost {
        fn new(platform: HostPlatform) -> Arc<Self> {
            Arc::new(Self {
                platform,
                lock: Mutex::new(None),
            })
        }

        fn with_lock(
            &self,
            tag: &str,
            f: impl FnOnce(&dyn WakeLock) -> Result<(), PlatformError>,
        ) -> Result<(), HookError> {
            let mut lock = self.lock.lock();
            if lock.is_none() {
                *lock = Some(self.platform.new_wake_lock(tag).map_err(failed)?);
            }
            match lock.as_deref() {
                Some(lock) => f(lock).map_err(failed),
                None => Ok(()),
            }
        }
    }

    fn failed(e: PlatformError) -> HookError {
        HookError::Failed {
            message: e.to_string(),
        }
    }

    impl WakeLockHooks for TestHost {
        fn acquire(&self, tag: String) -> Result<(), HookError> {
            self.with_lock(&tag, |lock| lock.acquire())
        }

        fn release(&self, tag: String) -> Result<(), HookError> {
            self.with_lock(&tag, |lock| lock.release())
        }

        fn is_held(&self, _tag: String) -> bool {
            self.platform.lock_held()
        }
    }

    impl NotificationHooks for TestHost {
        fn create_channel(&self, channel: ChannelRecord) -> Result<(), HookError> {
            let mut spec = KeepAliveConfig::default().channel;
            spec.id = channel.id;
            self.platform.create_channel(&spec).map_err(failed)
        }

        fn post(&self, notification: NotificationRecord) -> Result<(), HookError> {
            let mut spec = KeepAliveConfig::default().notification_spec();
            spec.channel_id = notification.channel_id;
            spec.id = notification.id;
            self.platform.post(&spec).map_err(failed)
        }

        fn cancel(&self, id: u32) -> Result<(), HookError> {
            self.platform.cancel(id).map_err(failed)
        }
    }

    impl PermissionHooks for TestHost {
        fn notifications_enabled(&self) -> Result<bool, HookError> {
            Ok(self.platform.notifications_enabled().unwrap_or(false))
        }

        fn request_notification_permission(&self) -> Result<(), HookError> {
            Ok(())
        }

        fn is_ignoring_battery_optimizations(&self) -> Result<bool, HookError> {
            Ok(self.platform.is_ignoring_battery_optimizations().unwrap_or(false))
        }

        fn request_ignore_battery_optimizations(&self) -> Result<(), HookError> {
            Err(HookError::Failed {
                message: "settings activity unavailable".to_string(),
            })
        }
    }

    fn bridge_on(host: &HostPlatform) -> KeepAliveBridge {
        let hooks = TestHost::new(host.clone());
        let options = BridgeOptions {
            sdk_int: 34,
            ..Default::default()
        };
        KeepAliveBridge::build(&options, hooks.clone(), hooks.clone(), hooks).unwrap()
    }

    #[test]
    fn test_mobile_bridge_lifecycle() {
        let host = HostPlatform::with_permissions(true, false);
        let bridge = bridge_on(&host);

        let outcome = bridge.start_task();
        assert!(outcome.ok);
        assert_eq!(outcome.value, Some(true));
        assert!(host.lock_held());

        let status = bridge.status().unwrap();
        assert_eq!(status.state, TaskState::Running);
        assert!(status.wake_lock_held);

        assert!(bridge.stop_task().ok);
        assert!(!host.lock_held());
        assert_eq!(bridge.status().unwrap().state, TaskState::Idle);
    }

    #[test]
    fn test_mobile_dispatch_unknown_method() {
        let host = HostPlatform::with_permissions(true, false);
        let bridge = bridge_on(&host);

        let outcome = bridge.dispatch("Foo".to_string());
        assert!(!outcome.ok);
        assert_eq!(outcome.error.unwrap().kind, FailureKind::NotImplemented);
    }

    #[test]
    fn test_mobile_dispatch_legacy_method_name() {
        let host = HostPlatform::with_permissions(true, false);
        let bridge = bridge_on(&host);

        assert!(bridge.dispatch("startForegroundService".to_string()).ok);
        assert!(host.lock_held());
        assert!(bridge.dispatch("stopForegroundService".to_string()).ok);
        assert!(!host.lock_held());
    }

    #[test]
    fn test_mobile_denied_start() {
        let host = HostPlatform::with_permissions(false, false);
        let bridge = bridge_on(&host);

        let outcome = bridge.start_task();
        let failure = outcome.error.unwrap();
        assert_eq!(failure.kind, FailureKind::PermissionDenied);
        assert_eq!(failure.code, "PERMISSION_DENIED");
    }

    #[test]
    fn test_mobile_hook_failure_maps_to_battery_error() {
        let host = HostPlatform::with_permissions(true, false);
        let bridge = bridge_on(&host);

        let failure = bridge.request_battery_exemption().error.unwrap();
        assert_eq!(failure.kind, FailureKind::BatteryExemptionRequestFailure);
        assert!(failure.message.contains("settings activity unavailable"));
    }

    #[test]
    fn test_mobile_permission_grant_and_destroy() {
        let host = HostPlatform::with_permissions(false, false);
        let bridge = bridge_on(&host);

        host.set_notifications_enabled(true);
        assert!(bridge.on_permission_result(true).ok);
        assert_eq!(bridge.status().unwrap().state, TaskState::Running);

        assert!(bridge.on_activity_destroyed().ok);
        assert!(!host.lock_held());
        assert_eq!(host.visible_notification(), None);
    }

    #[test]
    fn test_mobile_invalid_config_rejected() {
        let host = HostPlatform::new();
        let hooks = TestHost::new(host);
        let options = BridgeOptions {
            config_json: Some(r#"{"queue_depth": 0}"#.to_string()),
            ..Default::default()
        };
        let result = KeepAliveBridge::build(&options, hooks.clone(), hooks.clone(), hooks);
        assert!(matches!(result, Err(BridgeError::Config { .. })));
    }

    // The only test touching the process-wide slot
    #[test]
    fn test_mobile_install_is_singleton() {
        let host = HostPlatform::with_permissions(true, false);
        let hooks = TestHost::new(host);

        let bridge = KeepAliveBridge::install(
            BridgeOptions::default(),
            hooks.clone(),
            hooks.clone(),
            hooks.clone(),
        )
        .unwrap();
        assert!(shared_bridge().is_some_and(|b| Arc::ptr_eq(&b, &bridge)));

        let second = KeepAliveBridge::install(
            BridgeOptions::default(),
            hooks.clone(),
            hooks.clone(),
            hooks.clone(),
        );
        assert!(matches!(second, Err(BridgeError::AlreadyInstalled)));

        bridge.shutdown().unwrap();
        assert!(shared_bridge().is_none());

        let again =
            KeepAliveBridge::install(BridgeOptions::default(), hooks.clone(), hooks.clone(), hooks)
                .unwrap();
        again.shutdown().unwrap();
    }
}
