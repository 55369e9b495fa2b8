//! Failure isolation around provider calls: per-provider circuit breakers and
//! retry with exponential backoff.

pub mod health;
pub mod retry;

pub use health::{
    CircuitPermit, CircuitState, HealthSettings, ProviderHealthState, ProviderHealthTracker,
};
pub use retry::RetryPolicy;

use parking_lot::Mutex;
use std::fmt;
use std::time::{Duration, Instant};

/// Time source for circuit cooldowns, injectable so tests control the clock.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Instant;
}

/// Wall clock backed by `Instant::now`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.offset.lock()
    }
}
