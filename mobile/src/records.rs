// FFI records mirroring the core types

use keepalive_core::platform::{ChannelSpec, Importance, NotificationSpec};
use keepalive_core::{CommandError, CommandResult, CommandValue, ErrorKind, ServiceState, ServiceStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum ChannelImportance {
    Min,
    Low,
    Default,
    High,
}

impl From<Importance> for ChannelImportance {
    fn from(importance: Importance) -> Self {
        match importance {
            Importance::Min => Self::Min,
            Importance::Low => Self::Low,
            Importance::Default => Self::Default,
            Importance::High => Self::High,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct ChannelRecord {
    pub id: String,
    pub name: String,
    pub description: String,
    pub importance: ChannelImportance,
    pub show_badge: bool,
}

impl From<&ChannelSpec> for ChannelRecord {
    fn from(spec: &ChannelSpec) -> Self {
        Self {
            id: spec.id.clone(),
            name: spec.name.clone(),
            description: spec.description.clone(),
            importance: spec.importance.into(),
            show_badge: spec.show_badge,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct NotificationRecord {
    pub id: u32,
    pub channel_id: String,
    pub title: String,
    pub text: String,
    pub ongoing: bool,
    pub tap_target: String,
}

impl From<&NotificationSpec> for NotificationRecord {
    fn from(spec: &NotificationSpec) -> Self {
        Self {
            id: spec.id,
            channel_id: spec.channel_id.clone(),
            title: spec.title.clone(),
            text: spec.text.clone(),
            ongoing: spec.ongoing,
            tap_target: spec.tap_target.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum FailureKind {
    PermissionDenied,
    PermissionError,
    ServiceError,
    ServiceStartFailure,
    ServiceStopFailure,
    WakelockError,
    BatteryExemptionRequestFailure,
    NotImplemented,
}

impl From<ErrorKind> for FailureKind {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::PermissionDenied => Self::PermissionDenied,
            ErrorKind::PermissionError => Self::PermissionError,
            ErrorKind::ServiceError => Self::ServiceError,
            ErrorKind::ServiceStartFailure => Self::ServiceStartFailure,
            ErrorKind::ServiceStopFailure => Self::ServiceStopFailure,
            ErrorKind::WakelockError => Self::WakelockError,
            ErrorKind::BatteryExemptionRequestFailure => Self::BatteryExemptionRequestFailure,
            ErrorKind::NotImplemented => Self::NotImplemented,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct CommandFailure {
    pub kind: FailureKind,
    /// Wire code such as `PERMISSION_DENIED`
    pub code: String,
    pub message: String,
}

impl From<CommandError> for CommandFailure {
    fn from(err: CommandError) -> Self {
        Self {
            kind: err.kind.into(),
            code: err.kind.code().to_string(),
            message: err.message,
        }
    }
}

/// Result of one command, shaped for platform method-channel replies
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct CommandOutcome {
    pub ok: bool,
    pub value: Option<bool>,
    pub error: Option<CommandFailure>,
}

impl From<CommandResult> for CommandOutcome {
    fn from(result: CommandResult) -> Self {
        match result {
            Ok(value) => Self {
                ok: true,
                value: match value {
                    CommandValue::Bool(b) => Some(b),
                    CommandValue::Status(_) | CommandValue::Unit => None,
                },
                error: None,
            },
            Err(err) => Self {
                ok: false,
                value: None,
                error: Some(err.into()),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum TaskState {
    Idle,
    Starting,
    Running,
    Stopping,
}

impl From<ServiceState> for TaskState {
    fn from(state: ServiceState) -> Self {
        match state {
            ServiceState::Idle => Self::Idle,
            ServiceState::Starting => Self::Starting,
            ServiceState::Running => Self::Running,
            ServiceState::Stopping => Self::Stopping,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct TaskStatus {
    pub state: TaskState,
    pub wake_lock_held: bool,
    pub notification_posted: bool,
    pub notifications_enabled: Option<bool>,
    pub battery_exempt: Option<bool>,
    pub uptime_secs: u64,
    pub starts: u64,
    pub stops: u64,
}

impl From<ServiceStatus> for TaskStatus {
    fn from(status: ServiceStatus) -> Self {
        Self {
            state: status.state.into(),
            wake_lock_held: status.wake_lock_held,
            notification_posted: status.notification_posted,
            notifications_enabled: status.permissions.map(|p| p.notifications_enabled),
            battery_exempt: status.permissions.map(|p| p.battery_exempt),
            uptime_secs: status.uptime_secs,
            starts: status.starts,
            stops: status.stops,
        }
    }
}
