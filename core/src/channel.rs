//! Command channel between the UI layer and the lifecycle manager
//!
//! The manager lives on a dedicated OS thread with its own single-threaded
//! Tokio runtime. The only way to reach it is a [`CommandChannel`] handle,
//! which carries typed commands in and typed results out. Requests are
//! processed strictly one at a time, so no two transitions interleave.
//!
//! Teardown travels on a separate priority lane that the actor always polls
//! first: it overtakes any queued command and cancels queued starts.

use crate::error::{ChannelError, CommandError, ErrorKind};
use crate::service::{LifecycleManager, ServiceStatus};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};

// ============================================================================
// COMMANDS
// ============================================================================

/// Commands the UI layer can issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Command {
    CheckNotificationPermission,
    RequestNotificationPermission,
    #[serde(alias = "startForegroundService")]
    StartTask,
    #[serde(alias = "stopForegroundService")]
    StopTask,
    #[serde(alias = "requestIgnoreBatteryOptimizations")]
    RequestBatteryExemption,
    CheckBatteryExemption,
    GetStatus,
}

impl Command {
    pub const ALL: [Command; 7] = [
        Command::CheckNotificationPermission,
        Command::RequestNotificationPermission,
        Command::StartTask,
        Command::StopTask,
        Command::RequestBatteryExemption,
        Command::CheckBatteryExemption,
        Command::GetStatus,
    ];

    /// Resolve a wire tag. Accepts camelCase, PascalCase and the method
    /// names of the older foreground-service surface.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let command = match tag {
            "checkNotificationPermission" | "CheckNotificationPermission" => {
                Self::CheckNotificationPermission
            }
            "requestNotificationPermission" | "RequestNotificationPermission" => {
                Self::RequestNotificationPermission
            }
            "startTask" | "StartTask" | "startForegroundService" => Self::StartTask,
            "stopTask" | "StopTask" | "stopForegroundService" => Self::StopTask,
            "requestBatteryExemption"
            | "RequestBatteryExemption"
            | "requestIgnoreBatteryOptimizations" => Self::RequestBatteryExemption,
            "checkBatteryExemption" | "CheckBatteryExemption" => Self::CheckBatteryExemption,
            "getStatus" | "GetStatus" => Self::GetStatus,
            _ => return None,
        };
        Some(command)
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::CheckNotificationPermission => "checkNotificationPermission",
            Self::RequestNotificationPermission => "requestNotificationPermission",
            Self::StartTask => "startTask",
            Self::StopTask => "stopTask",
            Self::RequestBatteryExemption => "requestBatteryExemption",
            Self::CheckBatteryExemption => "checkBatteryExemption",
            Self::GetStatus => "getStatus",
        }
    }

    /// Error kind reported when the handler aborts
    fn failure_kind(&self) -> ErrorKind {
        match self {
            Self::StartTask => ErrorKind::ServiceStartFailure,
            Self::StopTask => ErrorKind::ServiceStopFailure,
            Self::RequestBatteryExemption => ErrorKind::BatteryExemptionRequestFailure,
            Self::CheckNotificationPermission
            | Self::RequestNotificationPermission
            | Self::CheckBatteryExemption => ErrorKind::PermissionError,
            Self::GetStatus => ErrorKind::ServiceError,
        }
    }

    fn is_transition(&self) -> bool {
        matches!(self, Self::StartTask | Self::StopTask)
    }
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Command::from_tag(s).ok_or_else(|| CommandError::not_implemented(s))
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Platform lifecycle callbacks, delivered through the same queue as commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LifecycleEvent {
    /// The user answered the notification permission prompt
    PermissionResult { granted: bool },
}

// ============================================================================
// RESULTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandValue {
    Bool(bool),
    Status(Box<ServiceStatus>),
    Unit,
}

impl CommandValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

pub type CommandResult = Result<CommandValue, CommandError>;

/// JSON envelope for transports that cannot carry a `Result`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<CommandValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<CommandError>,
}

impl From<CommandResult> for CommandResponse {
    fn from(result: CommandResult) -> Self {
        match result {
            Ok(value) => Self {
                ok: true,
                value: Some(value),
                error: None,
            },
            Err(error) => Self {
                ok: false,
                value: None,
                error: Some(error),
            },
        }
    }
}

// ============================================================================
// ACTOR
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum Request {
    Command(Command),
    Event(LifecycleEvent),
}

impl Request {
    fn failure_kind(&self) -> ErrorKind {
        match self {
            Request::Command(command) => command.failure_kind(),
            Request::Event(LifecycleEvent::PermissionResult { .. }) => {
                ErrorKind::ServiceStartFailure
            }
        }
    }

    fn is_transition(&self) -> bool {
        match self {
            Request::Command(command) => command.is_transition(),
            Request::Event(_) => true,
        }
    }

    /// Requests that would bring the task back up
    fn is_start(&self) -> bool {
        matches!(
            self,
            Request::Command(Command::StartTask) | Request::Event(_)
        )
    }

    fn cancelled(&self) -> CommandError {
        CommandError::new(self.failure_kind(), "Cancelled by process teardown")
    }
}

struct Envelope {
    request: Request,
    /// Teardown epoch observed when the caller issued the request
    epoch: u64,
    reply: oneshot::Sender<CommandResult>,
}

enum Priority {
    Teardown {
        epoch: u64,
        reply: oneshot::Sender<CommandResult>,
    },
    Shutdown(oneshot::Sender<CommandResult>),
}

struct LifecycleActor {
    manager: LifecycleManager,
    rx: mpsc::Receiver<Envelope>,
    priority_rx: mpsc::UnboundedReceiver<Priority>,
    /// Epoch of the latest teardown processed
    torn_down: u64,
}

impl LifecycleActor {
    async fn run(mut self) {
        tracing::info!("lifecycle manager accepting commands");

        loop {
            tokio::select! {
                biased;

                priority = self.priority_rx.recv() => match priority {
                    Some(Priority::Teardown { epoch, reply }) => {
                        self.torn_down = self.torn_down.max(epoch);
                        self.teardown();
                        let _ = reply.send(Ok(CommandValue::Unit));
                    }
                    Some(Priority::Shutdown(reply)) => {
                        self.teardown();
                        let _ = reply.send(Ok(CommandValue::Unit));
                        break;
                    }
                    None => break,
                },

                envelope = self.rx.recv() => match envelope {
                    Some(Envelope { request, epoch, reply }) => {
                        // Issued before a teardown but enqueued after it,
                        // typically while blocked on a full queue
                        let result = if request.is_start() && epoch < self.torn_down {
                            tracing::info!(?request, "dropping start issued before teardown");
                            Err(request.cancelled())
                        } else {
                            self.handle(request)
                        };
                        let _ = reply.send(result);
                    }
                    None => break,
                },
            }
        }

        self.manager.teardown();
        tracing::info!("lifecycle manager stopped");
    }

    /// Force the release sequence, then settle every queued request:
    /// queued starts are cancelled, queued stops are already satisfied.
    fn teardown(&mut self) {
        tracing::info!(state = %self.manager.state(), "teardown requested");
        self.manager.teardown();

        while let Ok(Envelope { request, reply, .. }) = self.rx.try_recv() {
            let result = match request {
                Request::Command(Command::StopTask) => Ok(CommandValue::Bool(true)),
                _ if request.is_start() => Err(request.cancelled()),
                _ => self.handle(request),
            };
            let _ = reply.send(result);
        }
    }

    fn handle(&mut self, request: Request) -> CommandResult {
        let manager = &mut self.manager;
        match catch_unwind(AssertUnwindSafe(|| dispatch(manager, request))) {
            Ok(result) => {
                if let Err(e) = &result {
                    tracing::debug!(?request, kind = %e.kind, "command failed: {}", e.message);
                }
                result
            }
            Err(panic) => {
                let message = panic_message(&*panic);
                tracing::error!(?request, "command handler aborted: {}", message);
                if request.is_transition() {
                    let manager = &mut self.manager;
                    if catch_unwind(AssertUnwindSafe(|| manager.teardown())).is_err() {
                        tracing::error!("release after aborted command also aborted");
                    }
                }
                Err(CommandError::new(request.failure_kind(), message))
            }
        }
    }
}

fn dispatch(manager: &mut LifecycleManager, request: Request) -> CommandResult {
    let value = match request {
        Request::Command(Command::CheckNotificationPermission) => {
            CommandValue::Bool(manager.check_notification_permission()?)
        }
        Request::Command(Command::RequestNotificationPermission) => {
            CommandValue::Bool(manager.request_notification_permission()?)
        }
        Request::Command(Command::StartTask) => CommandValue::Bool(manager.start_task()?),
        Request::Command(Command::StopTask) => CommandValue::Bool(manager.stop_task()?),
        Request::Command(Command::RequestBatteryExemption) => {
            CommandValue::Bool(manager.request_battery_exemption()?)
        }
        Request::Command(Command::CheckBatteryExemption) => {
            CommandValue::Bool(manager.check_battery_exemption()?)
        }
        Request::Command(Command::GetStatus) => {
            CommandValue::Status(Box::new(manager.status()))
        }
        Request::Event(LifecycleEvent::PermissionResult { granted }) => {
            CommandValue::Bool(manager.on_permission_result(granted)?)
        }
    };
    Ok(value)
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

// ============================================================================
// HANDLE
// ============================================================================

/// Cloneable handle to the running lifecycle manager
#[derive(Clone)]
pub struct CommandChannel {
    tx: mpsc::Sender<Envelope>,
    priority_tx: mpsc::UnboundedSender<Priority>,
    /// Bumped by every teardown before it is sent
    epoch: Arc<AtomicU64>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl CommandChannel {
    /// Move the manager onto its own thread and return the only handle to it
    pub fn spawn(manager: LifecycleManager, queue_depth: usize) -> Result<Self, ChannelError> {
        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        let (priority_tx, priority_rx) = mpsc::unbounded_channel();
        let actor = LifecycleActor {
            manager,
            rx,
            priority_rx,
            torn_down: 0,
        };

        // Own runtime on a dedicated thread: callers are UI threads that are
        // not inside a Tokio context, and the manager must outlive them.
        let worker = std::thread::Builder::new()
            .name("keepalive-lifecycle".to_string())
            .spawn(move || {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build();
                match rt {
                    Ok(rt) => rt.block_on(actor.run()),
                    Err(e) => {
                        // Dropping the actor drops the manager, which releases
                        tracing::error!("Failed to create lifecycle runtime: {}", e);
                    }
                }
            })
            .map_err(|e| ChannelError::Spawn(e.to_string()))?;

        Ok(Self {
            tx,
            priority_tx,
            epoch: Arc::new(AtomicU64::new(0)),
            worker: Arc::new(Mutex::new(Some(worker))),
        })
    }

    fn envelope(&self, request: Request) -> (Envelope, oneshot::Receiver<CommandResult>) {
        let (reply, rx) = oneshot::channel();
        let envelope = Envelope {
            request,
            epoch: self.epoch.load(Ordering::SeqCst),
            reply,
        };
        (envelope, rx)
    }

    async fn request(&self, request: Request) -> CommandResult {
        let (envelope, rx) = self.envelope(request);
        self.tx
            .send(envelope)
            .await
            .map_err(|_| ChannelError::Closed)?;
        rx.await.map_err(|_| ChannelError::NoReply)?
    }

    fn request_blocking(&self, request: Request) -> CommandResult {
        let (envelope, rx) = self.envelope(request);
        self.tx
            .blocking_send(envelope)
            .map_err(|_| ChannelError::Closed)?;
        rx.blocking_recv().map_err(|_| ChannelError::NoReply)?
    }

    /// Send a command and wait for its result
    pub async fn send(&self, command: Command) -> CommandResult {
        self.request(Request::Command(command)).await
    }

    /// Blocking variant of [`send`](Self::send).
    ///
    /// Must not be called from inside an async runtime.
    pub fn send_blocking(&self, command: Command) -> CommandResult {
        self.request_blocking(Request::Command(command))
    }

    /// Route a raw wire tag; unknown tags yield `NotImplemented`
    pub async fn dispatch(&self, tag: &str) -> CommandResult {
        match Command::from_tag(tag) {
            Some(command) => self.send(command).await,
            None => Err(CommandError::not_implemented(tag)),
        }
    }

    pub fn dispatch_blocking(&self, tag: &str) -> CommandResult {
        match Command::from_tag(tag) {
            Some(command) => self.send_blocking(command),
            None => Err(CommandError::not_implemented(tag)),
        }
    }

    /// Deliver a platform lifecycle event
    pub async fn notify(&self, event: LifecycleEvent) -> CommandResult {
        self.request(Request::Event(event)).await
    }

    pub fn notify_blocking(&self, event: LifecycleEvent) -> CommandResult {
        self.request_blocking(Request::Event(event))
    }

    fn send_priority(
        &self,
        make: impl FnOnce(oneshot::Sender<CommandResult>) -> Priority,
    ) -> Result<oneshot::Receiver<CommandResult>, ChannelError> {
        let (reply, rx) = oneshot::channel();
        self.priority_tx
            .send(make(reply))
            .map_err(|_| ChannelError::Closed)?;
        Ok(rx)
    }

    // Starts issued before this point are void even if they reach the queue
    // after the teardown has been processed.
    fn teardown_request(&self, reply: oneshot::Sender<CommandResult>) -> Priority {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        Priority::Teardown { epoch, reply }
    }

    /// Force `Idle` ahead of anything queued
    pub async fn teardown(&self) -> CommandResult {
        let rx = self.send_priority(|reply| self.teardown_request(reply))?;
        rx.await.map_err(|_| ChannelError::NoReply)?
    }

    pub fn teardown_blocking(&self) -> CommandResult {
        let rx = self.send_priority(|reply| self.teardown_request(reply))?;
        rx.blocking_recv().map_err(|_| ChannelError::NoReply)?
    }

    /// Tear down and stop the manager thread, waiting for it to exit.
    ///
    /// Must not be called from inside an async runtime.
    pub fn shutdown(&self) -> Result<(), ChannelError> {
        let result = self
            .send_priority(Priority::Shutdown)
            .and_then(|rx| rx.blocking_recv().map_err(|_| ChannelError::NoReply));

        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                tracing::error!("lifecycle thread panicked");
            }
        }

        result.map(|_| ())
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl std::fmt::Debug for CommandChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandChannel")
            .field("closed", &self.is_closed())
            .finish()
    }
}
