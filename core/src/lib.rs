// Keep-alive core — background capture lifecycle
//
// Keeps a device-resident capture process alive across screen lock and app
// backgrounding: a wake lock, a persistent notification, and the permission
// checks that gate both, driven by the UI through a command channel.

pub mod channel;
pub mod config;
pub mod error;
pub mod logging;
pub mod platform;
pub mod service;

pub use channel::{
    Command, CommandChannel, CommandResponse, CommandResult, CommandValue, LifecycleEvent,
};
pub use config::KeepAliveConfig;
pub use error::{ChannelError, CommandError, ConfigError, ErrorKind, KeepAliveError};
pub use logging::LoggingConfig;
pub use platform::{
    HostPlatform, NotificationService, PermissionService, PlatformCapabilities, PlatformError,
    PlatformServices, PowerService, WakeLock,
};
pub use service::{LifecycleManager, PermissionStatus, ServiceState, ServiceStatus};

/// Build the lifecycle manager and move it behind a command channel
pub fn spawn(
    config: &KeepAliveConfig,
    platform: PlatformServices,
) -> Result<CommandChannel, KeepAliveError> {
    let manager = LifecycleManager::new(config, platform)?;
    let channel = CommandChannel::spawn(manager, config.queue_depth)?;
    tracing::info!(tag = %config.wake_lock_tag, "keep-alive lifecycle manager spawned");
    Ok(channel)
}
