use keepalive_core::platform::{ChannelSpec, HostOp, NotificationSpec};
use keepalive_core::{
    Command, CommandChannel, CommandValue, ErrorKind, HostPlatform, KeepAliveConfig,
    LifecycleEvent, LifecycleManager, NotificationService, PermissionService,
    PlatformCapabilities, PlatformError, PlatformServices, ServiceState, ServiceStatus,
};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

fn spawn_with(platform: PlatformServices) -> CommandChannel {
    spawn_with_depth(platform, 16)
}

fn spawn_with_depth(platform: PlatformServices, queue_depth: usize) -> CommandChannel {
    let manager = LifecycleManager::new(&KeepAliveConfig::default(), platform).unwrap();
    CommandChannel::spawn(manager, queue_depth).unwrap()
}

fn gated_platform(host: &HostPlatform) -> (PlatformServices, mpsc::Sender<()>) {
    let (release, gate) = mpsc::channel();
    let permissions = GatedPermissions {
        host: host.clone(),
        gate: Mutex::new(Some(gate)),
    };
    let platform = PlatformServices {
        permissions: Arc::new(permissions),
        ..PlatformServices::host(host, PlatformCapabilities::android(34))
    };
    (platform, release)
}

fn spawn(host: &HostPlatform) -> CommandChannel {
    spawn_with(PlatformServices::host(host, PlatformCapabilities::android(34)))
}

async fn status(channel: &CommandChannel) -> ServiceStatus {
    match channel.send(Command::GetStatus).await.unwrap() {
        CommandValue::Status(status) => *status,
        other => panic!("unexpected value {:?}", other),
    }
}

/// Permission service whose first query blocks until released, keeping the
/// lifecycle thread busy while the test queues more requests behind it.
struct GatedPermissions {
    host: HostPlatform,
    gate: Mutex<Option<mpsc::Receiver<()>>>,
}

impl PermissionService for GatedPermissions {
    fn notifications_enabled(&self) -> Result<bool, PlatformError> {
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.recv();
        }
        self.host.notifications_enabled()
    }

    fn request_notification_permission(&self) -> Result<(), PlatformError> {
        self.host.request_notification_permission()
    }

    fn is_ignoring_battery_optimizations(&self) -> Result<bool, PlatformError> {
        self.host.is_ignoring_battery_optimizations()
    }

    fn request_ignore_battery_optimizations(&self) -> Result<(), PlatformError> {
        self.host.request_ignore_battery_optimizations()
    }
}

/// Permission service that aborts, standing in for a foreign callback crash
struct PanickingPermissions;

impl PermissionService for PanickingPermissions {
    fn notifications_enabled(&self) -> Result<bool, PlatformError> {
        panic!("permission bridge crashed")
    }

    fn request_notification_permission(&self) -> Result<(), PlatformError> {
        Ok(())
    }

    fn is_ignoring_battery_optimizations(&self) -> Result<bool, PlatformError> {
        Ok(true)
    }

    fn request_ignore_battery_optimizations(&self) -> Result<(), PlatformError> {
        Ok(())
    }
}

/// Notification service whose cancel aborts, standing in for a crash while
/// withdrawing the notification on stop
struct PanickingCancel {
    host: HostPlatform,
}

impl NotificationService for PanickingCancel {
    fn create_channel(&self, channel: &ChannelSpec) -> Result<(), PlatformError> {
        self.host.create_channel(channel)
    }

    fn post(&self, notification: &NotificationSpec) -> Result<(), PlatformError> {
        self.host.post(notification)
    }

    fn cancel(&self, _id: u32) -> Result<(), PlatformError> {
        panic!("notification bridge crashed")
    }
}

#[tokio::test]
async fn test_start_stop_over_channel() {
    let host = HostPlatform::with_permissions(true, false);
    let channel = spawn(&host);

    let value = channel.dispatch("startTask").await.unwrap();
    assert_eq!(value, CommandValue::Bool(true));
    let running = status(&channel).await;
    assert_eq!(running.state, ServiceState::Running);
    assert!(running.wake_lock_held);

    let value = channel.dispatch("stopTask").await.unwrap();
    assert_eq!(value, CommandValue::Bool(true));
    let idle = status(&channel).await;
    assert_eq!(idle.state, ServiceState::Idle);
    assert!(!idle.wake_lock_held);
    assert!(!host.lock_held());
}

#[tokio::test]
async fn test_permission_denied_over_channel() {
    let host = HostPlatform::with_permissions(false, false);
    let channel = spawn(&host);

    let err = channel.send(Command::StartTask).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::PermissionDenied);
    assert_eq!(status(&channel).await.state, ServiceState::Idle);
}

#[tokio::test]
async fn test_unknown_command_leaves_state_unchanged() {
    let host = HostPlatform::with_permissions(true, false);
    let channel = spawn(&host);
    channel.send(Command::StartTask).await.unwrap();

    let err = channel.dispatch("Foo").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotImplemented);
    assert_eq!(status(&channel).await.state, ServiceState::Running);
}

#[tokio::test]
async fn test_permission_requests_are_fire_and_forget() {
    let host = HostPlatform::with_permissions(false, false);
    let channel = spawn(&host);

    let value = channel
        .dispatch("requestNotificationPermission")
        .await
        .unwrap();
    assert_eq!(value.as_bool(), Some(true));
    let value = channel
        .dispatch("requestIgnoreBatteryOptimizations")
        .await
        .unwrap();
    assert_eq!(value.as_bool(), Some(true));

    // Nothing changed state; the grant arrives out-of-band
    assert_eq!(status(&channel).await.state, ServiceState::Idle);
    assert_eq!(
        channel
            .send(Command::CheckNotificationPermission)
            .await
            .unwrap(),
        CommandValue::Bool(false)
    );

    host.set_notifications_enabled(true);
    assert_eq!(
        channel
            .send(Command::CheckNotificationPermission)
            .await
            .unwrap(),
        CommandValue::Bool(true)
    );

    let counts = host.counts();
    assert_eq!(counts.notification_prompts, 1);
    assert_eq!(counts.battery_prompts, 1);
}

#[tokio::test]
async fn test_permission_grant_event_starts_task() {
    let host = HostPlatform::with_permissions(false, false);
    let channel = spawn(&host);

    host.set_notifications_enabled(true);
    let value = channel
        .notify(LifecycleEvent::PermissionResult { granted: true })
        .await
        .unwrap();
    assert_eq!(value, CommandValue::Bool(true));
    assert_eq!(status(&channel).await.state, ServiceState::Running);
}

#[tokio::test]
async fn test_teardown_forces_idle() {
    let host = HostPlatform::with_permissions(true, false);
    let channel = spawn(&host);
    channel.send(Command::StartTask).await.unwrap();

    channel.teardown().await.unwrap();
    let status = status(&channel).await;
    assert_eq!(status.state, ServiceState::Idle);
    assert!(!status.wake_lock_held);
    assert!(!host.lock_held());
    assert_eq!(host.visible_notification(), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_teardown_preempts_queued_start() {
    let host = HostPlatform::with_permissions(true, false);
    let (platform, release) = gated_platform(&host);
    let channel = spawn_with(platform);

    // Occupies the lifecycle thread until the gate opens
    let busy = {
        let channel = channel.clone();
        tokio::spawn(async move { channel.send(Command::CheckNotificationPermission).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let queued_start = {
        let channel = channel.clone();
        tokio::spawn(async move { channel.send(Command::StartTask).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let teardown = {
        let channel = channel.clone();
        tokio::spawn(async move { channel.teardown().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    release.send(()).unwrap();

    assert_eq!(busy.await.unwrap().unwrap(), CommandValue::Bool(true));
    teardown.await.unwrap().unwrap();
    let err = queued_start.await.unwrap().unwrap_err();
    assert_eq!(err.kind, ErrorKind::ServiceStartFailure);

    assert_eq!(status(&channel).await.state, ServiceState::Idle);
    assert!(!host.lock_held());
    assert_eq!(host.counts().acquires, 0);
}

#[tokio::test]
async fn test_panicking_handler_becomes_structured_error() {
    let host = HostPlatform::with_permissions(true, false);
    let platform = PlatformServices {
        permissions: Arc::new(PanickingPermissions),
        ..PlatformServices::host(&host, PlatformCapabilities::android(34))
    };
    let channel = spawn_with(platform);

    let err = channel.send(Command::StartTask).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ServiceStartFailure);
    assert!(err.message.contains("permission bridge crashed"));

    let err = channel
        .send(Command::CheckNotificationPermission)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::PermissionError);

    // The manager survives and still answers
    assert_eq!(
        channel.send(Command::CheckBatteryExemption).await.unwrap(),
        CommandValue::Bool(true)
    );
    assert!(!host.lock_held());
    assert_eq!(host.counts().posts, 0);
}

#[test]
fn test_teardown_voids_start_blocked_on_full_queue() {
    let host = HostPlatform::with_permissions(true, false);
    let (platform, release) = gated_platform(&host);
    let channel = spawn_with_depth(platform, 1);

    let pause = || std::thread::sleep(Duration::from_millis(50));
    let send_in_thread = |command: Command| {
        let channel = channel.clone();
        std::thread::spawn(move || channel.send_blocking(command))
    };

    // Busy actor, one start filling the queue, one start blocked on it
    let busy = send_in_thread(Command::CheckNotificationPermission);
    pause();
    let queued_start = send_in_thread(Command::StartTask);
    pause();
    let blocked_start = send_in_thread(Command::StartTask);
    pause();

    let teardown = {
        let channel = channel.clone();
        std::thread::spawn(move || channel.teardown_blocking())
    };
    pause();
    release.send(()).unwrap();

    assert_eq!(busy.join().unwrap().unwrap(), CommandValue::Bool(true));
    teardown.join().unwrap().unwrap();
    for start in [queued_start, blocked_start] {
        let err = start.join().unwrap().unwrap_err();
        assert_eq!(err.kind, ErrorKind::ServiceStartFailure);
    }

    assert!(!host.lock_held());
    assert_eq!(host.visible_notification(), None);
    assert_eq!(host.counts().acquires, 0);

    // A start issued after the teardown runs normally
    assert_eq!(
        channel.send_blocking(Command::StartTask).unwrap(),
        CommandValue::Bool(true)
    );
    channel.shutdown().unwrap();
    assert!(!host.lock_held());
}

#[tokio::test]
async fn test_panicking_stop_becomes_stop_failure() {
    let host = HostPlatform::with_permissions(true, false);
    let platform = PlatformServices {
        notifications: Arc::new(PanickingCancel { host: host.clone() }),
        ..PlatformServices::host(&host, PlatformCapabilities::android(34))
    };
    let channel = spawn_with(platform);

    channel.send(Command::StartTask).await.unwrap();
    assert!(host.lock_held());

    let err = channel.send(Command::StopTask).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ServiceStopFailure);
    assert!(err.message.contains("notification bridge crashed"));

    // The forced release still ran
    let status = status(&channel).await;
    assert_eq!(status.state, ServiceState::Idle);
    assert!(!status.wake_lock_held);
    assert!(!host.lock_held());
}

#[tokio::test]
async fn test_acquire_failure_reports_start_failure() {
    let host = HostPlatform::with_permissions(true, false);
    let channel = spawn(&host);
    host.fail_next(HostOp::Acquire);

    let err = channel.send(Command::StartTask).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ServiceStartFailure);
    assert!(err.message.contains("Failed to acquire wake lock"));
    assert_eq!(status(&channel).await.state, ServiceState::Idle);
    assert_eq!(host.visible_notification(), None);
}

#[test]
fn test_concurrent_callers_are_serialized() {
    let host = HostPlatform::with_permissions(true, false);
    let channel = spawn(&host);

    let workers: Vec<_> = (0..8)
        .map(|i| {
            let channel = channel.clone();
            std::thread::spawn(move || {
                for j in 0..25 {
                    let command = if (i + j) % 2 == 0 {
                        Command::StartTask
                    } else {
                        Command::StopTask
                    };
                    assert_eq!(
                        channel.send_blocking(command).unwrap(),
                        CommandValue::Bool(true)
                    );
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let status = match channel.send_blocking(Command::GetStatus).unwrap() {
        CommandValue::Status(status) => status,
        other => panic!("unexpected value {:?}", other),
    };
    let running = status.state == ServiceState::Running;
    assert_eq!(status.wake_lock_held, running);
    assert_eq!(host.lock_held(), running);

    // Every acquire was matched by a release except a final outstanding one
    let counts = host.counts();
    assert_eq!(counts.acquires - counts.releases, u32::from(running));
    assert_eq!(counts.posts - counts.cancels, u32::from(running));

    channel.shutdown().unwrap();
    assert!(!host.lock_held());
}

#[test]
fn test_dropping_last_handle_releases() {
    let host = HostPlatform::with_permissions(true, false);
    let channel = spawn(&host);
    channel.send_blocking(Command::StartTask).unwrap();
    assert!(host.lock_held());

    drop(channel);

    // The lifecycle thread notices the closed queue and tears down
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while host.lock_held() && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(!host.lock_held());
    assert_eq!(host.visible_notification(), None);
}
