//! Wall clocks.
//!
//! Components that need "now" take a [`Clock`] so a devnet can be moved
//! forward in time without touching the host clock.

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::info;

/// Source of the current time.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Returns the current time.
    fn now(&self) -> SystemTime;

    /// Returns the current time as seconds since the Unix epoch.
    fn unix_secs(&self) -> u64 {
        self.now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// The host clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A clock running at host speed with an adjustable forward offset.
#[derive(Debug, Default, Clone)]
pub struct TimeTravelClock {
    offset: Arc<RwLock<Duration>>,
}

impl TimeTravelClock {
    /// Creates a clock with no offset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.write();
        *offset += by;
        info!(offset_secs = offset.as_secs(), "time travel");
    }

    /// Returns the accumulated offset.
    pub fn offset(&self) -> Duration {
        *self.offset.read()
    }
}

impl Clock for TimeTravelClock {
    fn now(&self) -> SystemTime {
        SystemTime::now() + *self.offset.read()
    }
}
