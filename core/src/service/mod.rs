//! Background keep-alive service
//!
//! - `guard`: idempotent wake-lock ownership
//! - `permission`: notification permission and battery exemption queries
//! - `presenter`: notification channel and persistent notification
//! - `lifecycle`: the state machine orchestrating the three

pub mod guard;
pub mod lifecycle;
pub mod permission;
pub mod presenter;

pub use guard::ResourceGuard;
pub use lifecycle::{LifecycleManager, ServiceState, ServiceStatus};
pub use permission::{PermissionGate, PermissionStatus};
pub use presenter::NotificationPresenter;
