//! Resource guard around the platform wake lock
//!
//! The platform lock is created lazily on the first acquire and kept for the
//! rest of the process so it can be re-acquired after a release. `acquire`
//! and `release` are idempotent: at most one hold is ever outstanding.

use crate::platform::{PlatformError, PowerService, WakeLock};
use std::sync::Arc;

pub struct ResourceGuard {
    power: Arc<dyn PowerService>,
    tag: String,
    lock: Option<Box<dyn WakeLock>>,
    held: bool,
}

impl ResourceGuard {
    pub fn new(power: Arc<dyn PowerService>, tag: impl Into<String>) -> Self {
        Self {
            power,
            tag: tag.into(),
            lock: None,
            held: false,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Take the wake lock unless it is already held
    pub fn acquire(&mut self) -> Result<(), PlatformError> {
        if self.held {
            return Ok(());
        }

        if self.lock.is_none() {
            self.lock = Some(self.power.new_wake_lock(&self.tag)?);
        }

        if let Some(lock) = &self.lock {
            lock.acquire()?;
            self.held = true;
            tracing::debug!(tag = %self.tag, "wake lock acquired");
        }
        Ok(())
    }

    /// Release the wake lock if held
    ///
    /// The guard's flag is cleared even when the platform call fails: a
    /// failed release leaves nothing we could retry against.
    pub fn release(&mut self) -> Result<(), PlatformError> {
        if !self.held {
            return Ok(());
        }
        self.held = false;

        match &self.lock {
            // The OS may already have dropped it (timeout); releasing an
            // unheld platform lock throws on Android.
            Some(lock) if lock.is_held() => {
                lock.release()?;
                tracing::debug!(tag = %self.tag, "wake lock released");
            }
            Some(_) => {
                tracing::debug!(tag = %self.tag, "wake lock already dropped by platform");
            }
            None => {}
        }
        Ok(())
    }

    pub fn is_held(&self) -> bool {
        self.held
    }
}

impl std::fmt::Debug for ResourceGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceGuard")
            .field("tag", &self.tag)
            .field("created", &self.lock.is_some())
            .field("held", &self.held)
            .finish()
    }
}
