// Interactive session against the simulated platform
//
// A line is either a command tag routed through the channel, or a directive
// that plays the part of the user and the OS: granting permissions, answering
// the permission prompt, destroying the activity.

use anyhow::Result;
use keepalive_core::{
    CommandChannel, CommandResponse, HostPlatform, LifecycleEvent, PlatformServices,
};
use serde::Serialize;

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Permission {
    Notifications,
    Battery,
}

impl Permission {
    fn parse(word: &str) -> Option<Self> {
        match word {
            "notifications" | "notification" => Some(Self::Notifications),
            "battery" => Some(Self::Battery),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Directive {
    Grant(Permission),
    Revoke(Permission),
    /// The user answered the notification permission prompt
    Answer { granted: bool },
    /// The hosting activity was destroyed
    Destroy,
}

impl Directive {
    fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let verb = words.next()?;
        let arg = words.next();
        match (verb, arg) {
            ("grant", Some(what)) => Permission::parse(what).map(Self::Grant),
            ("revoke", Some(what)) => Permission::parse(what).map(Self::Revoke),
            ("answer", Some("granted")) => Some(Self::Answer { granted: true }),
            ("answer", Some("denied")) => Some(Self::Answer { granted: false }),
            ("destroy", None) => Some(Self::Destroy),
            _ => None,
        }
    }
}

/// One executed line and its reply
#[derive(Debug, Clone, Serialize)]
pub struct Reply {
    pub input: String,
    #[serde(flatten)]
    pub response: CommandResponse,
}

pub struct Session {
    host: HostPlatform,
    channel: CommandChannel,
}

impl Session {
    pub fn new(config: &Config) -> Result<Self> {
        let simulation = &config.simulation;
        let host = HostPlatform::with_permissions(
            simulation.notifications_enabled,
            simulation.battery_exempt,
        );
        let platform = PlatformServices::host(&host, simulation.capabilities());
        let channel = keepalive_core::spawn(&config.keepalive, platform)?;
        tracing::debug!(sdk = simulation.sdk_int, "session started");
        Ok(Self { host, channel })
    }

    pub fn host(&self) -> &HostPlatform {
        &self.host
    }

    /// Run one line: a directive, or a tag for the command channel
    pub async fn execute(&self, line: &str) -> Reply {
        let line = line.trim();
        let result = match Directive::parse(line) {
            Some(directive) => self.apply(directive).await,
            None => self.channel.dispatch(line).await,
        };
        Reply {
            input: line.to_string(),
            response: result.into(),
        }
    }

    async fn apply(&self, directive: Directive) -> keepalive_core::CommandResult {
        tracing::debug!(?directive, "applying directive");
        match directive {
            Directive::Grant(Permission::Notifications) => {
                self.host.set_notifications_enabled(true);
                Ok(keepalive_core::CommandValue::Unit)
            }
            Directive::Revoke(Permission::Notifications) => {
                self.host.set_notifications_enabled(false);
                Ok(keepalive_core::CommandValue::Unit)
            }
            Directive::Grant(Permission::Battery) => {
                self.host.set_battery_exempt(true);
                Ok(keepalive_core::CommandValue::Unit)
            }
            Directive::Revoke(Permission::Battery) => {
                self.host.set_battery_exempt(false);
                Ok(keepalive_core::CommandValue::Unit)
            }
            Directive::Answer { granted } => {
                // The OS records the answer before the app hears about it
                self.host.set_notifications_enabled(granted);
                self.channel
                    .notify(LifecycleEvent::PermissionResult { granted })
                    .await
            }
            Directive::Destroy => self.channel.teardown().await,
        }
    }

    /// Tear down and join the lifecycle thread
    pub async fn close(self) -> Result<()> {
        let channel = self.channel;
        tokio::task::spawn_blocking(move || channel.shutdown()).await??;
        Ok(())
    }
}
