//! Per-provider circuit breaker.
//!
//! Each provider owns one state machine behind its own lock, so failures at one
//! provider never serialize calls to another.
//!
//! ```text
//!   Closed --N consecutive failures--> Open --cooldown elapsed--> HalfOpen
//!     ^                                  ^                           |
//!     |                                  +------ trial fails --------+
//!     +------------------------------ trial succeeds ----------------+
//! ```

use super::{Clock, SystemClock};
use crate::config::HealthConfig;
use crate::error::ProviderError;
use crate::types::ProviderId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Circuit breaker state for a single provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    /// Healthy, requests allowed.
    Closed,
    /// Tripped, requests rejected until the cooldown expires.
    Open,
    /// Cooldown expired, one trial request allowed.
    HalfOpen,
}

/// Thresholds and cooldowns for the breaker.
#[derive(Debug, Clone)]
pub struct HealthSettings {
    pub failure_threshold: u32,
    pub cooldown: Duration,
    /// Applied to the cooldown each time a trial fails.
    pub cooldown_multiplier: f64,
    pub max_cooldown: Duration,
}

impl HealthSettings {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            cooldown,
            cooldown_multiplier: 1.0,
            max_cooldown: cooldown,
        }
    }

    pub fn from_config(config: &HealthConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            cooldown: config.cooldown(),
            cooldown_multiplier: config.cooldown_multiplier.max(1.0),
            max_cooldown: config.max_cooldown(),
        }
    }

    fn grow(&self, cooldown: Duration) -> Duration {
        let cap = self.max_cooldown.max(self.cooldown);
        Duration::try_from_secs_f64(cooldown.as_secs_f64() * self.cooldown_multiplier)
            .map_or(cap, |grown| grown.min(cap))
    }
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self::from_config(&HealthConfig::default())
    }
}

/// Health of one provider.
#[derive(Debug, Clone)]
pub struct ProviderHealthState {
    pub provider: ProviderId,
    pub consecutive_failures: u32,
    pub circuit_state: CircuitState,
    /// Set whenever `circuit_state` is `Open` or `HalfOpen`.
    pub opened_at: Option<Instant>,
    pub cooldown: Duration,
    pub trial_in_flight: bool,
}

impl ProviderHealthState {
    fn new(provider: ProviderId, cooldown: Duration) -> Self {
        Self {
            provider,
            consecutive_failures: 0,
            circuit_state: CircuitState::Closed,
            opened_at: None,
            cooldown,
            trial_in_flight: false,
        }
    }

    fn cooldown_elapsed(&self, now: Instant) -> bool {
        self.opened_at
            .map_or(true, |opened| now.saturating_duration_since(opened) >= self.cooldown)
    }

    fn open(&mut self, now: Instant) {
        self.circuit_state = CircuitState::Open;
        self.opened_at = Some(now);
        self.trial_in_flight = false;
    }
}

/// Circuit breakers for every provider, shared across concurrent requests.
#[derive(Debug)]
pub struct ProviderHealthTracker {
    slots: [Mutex<ProviderHealthState>; ProviderId::ALL.len()],
    settings: HealthSettings,
    clock: Arc<dyn Clock>,
}

impl ProviderHealthTracker {
    pub fn new(settings: HealthSettings) -> Self {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    pub fn with_clock(settings: HealthSettings, clock: Arc<dyn Clock>) -> Self {
        let slots = ProviderId::ALL
            .map(|provider| Mutex::new(ProviderHealthState::new(provider, settings.cooldown)));
        Self {
            slots,
            settings,
            clock,
        }
    }

    pub fn from_config(config: &HealthConfig) -> Self {
        Self::new(HealthSettings::from_config(config))
    }

    pub fn settings(&self) -> &HealthSettings {
        &self.settings
    }

    fn slot(&self, provider: ProviderId) -> &Mutex<ProviderHealthState> {
        &self.slots[provider as usize]
    }

    /// Record the outcome of an ordinary (non-trial) call to `provider`.
    ///
    /// Only a closed circuit counts it. While the circuit is open or half-open
    /// the result is stale: the request was admitted before the circuit opened,
    /// and only the trial may decide the next state.
    pub fn record_outcome(&self, provider: ProviderId, success: bool) {
        self.settle(provider, success, false);
    }

    fn settle(&self, provider: ProviderId, success: bool, trial: bool) {
        let now = self.clock.now();
        let mut state = self.slot(provider).lock();

        if state.circuit_state != CircuitState::Closed && !trial {
            return;
        }

        if success {
            if state.circuit_state != CircuitState::Closed {
                info!(provider = %provider, "Circuit closed after successful trial");
            }
            state.consecutive_failures = 0;
            state.circuit_state = CircuitState::Closed;
            state.opened_at = None;
            state.cooldown = self.settings.cooldown;
            state.trial_in_flight = false;
            return;
        }

        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        match state.circuit_state {
            CircuitState::Closed => {
                if state.consecutive_failures >= self.settings.failure_threshold {
                    state.open(now);
                    warn!(
                        provider = %provider,
                        consecutive_failures = state.consecutive_failures,
                        cooldown_secs = state.cooldown.as_secs_f64(),
                        "Circuit opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                state.cooldown = self.settings.grow(state.cooldown);
                state.open(now);
                warn!(
                    provider = %provider,
                    cooldown_secs = state.cooldown.as_secs_f64(),
                    "Trial request failed, circuit re-opened"
                );
            }
            // A trial settling after its circuit was already re-opened.
            CircuitState::Open => {}
        }
    }

    /// Whether a request to `provider` would currently be admitted.
    pub fn is_available(&self, provider: ProviderId) -> bool {
        let now = self.clock.now();
        let state = self.slot(provider).lock();
        match state.circuit_state {
            CircuitState::Closed => true,
            CircuitState::Open => state.cooldown_elapsed(now),
            CircuitState::HalfOpen => !state.trial_in_flight,
        }
    }

    /// Providers whose circuit is not open, in declaration order.
    pub fn available_providers(&self) -> BTreeSet<ProviderId> {
        ProviderId::ALL
            .into_iter()
            .filter(|provider| self.is_available(*provider))
            .collect()
    }

    /// Effective state; an open circuit past its cooldown reports `HalfOpen`.
    pub fn circuit_state(&self, provider: ProviderId) -> CircuitState {
        let now = self.clock.now();
        let state = self.slot(provider).lock();
        match state.circuit_state {
            CircuitState::Open if state.cooldown_elapsed(now) => CircuitState::HalfOpen,
            other => other,
        }
    }

    pub fn snapshot(&self, provider: ProviderId) -> ProviderHealthState {
        self.slot(provider).lock().clone()
    }

    /// Ask to send one request to `provider`.
    ///
    /// A closed circuit always admits. An open circuit past its cooldown moves
    /// to `HalfOpen` and hands out the single trial permit; every other caller
    /// is rejected until that trial settles.
    pub fn try_acquire(&self, provider: ProviderId) -> Result<CircuitPermit<'_>, ProviderError> {
        let now = self.clock.now();
        let mut state = self.slot(provider).lock();
        let trial = match state.circuit_state {
            CircuitState::Closed => false,
            CircuitState::Open if state.cooldown_elapsed(now) => {
                state.circuit_state = CircuitState::HalfOpen;
                state.trial_in_flight = true;
                info!(provider = %provider, "Circuit half-open, admitting trial request");
                true
            }
            CircuitState::HalfOpen if !state.trial_in_flight => {
                state.trial_in_flight = true;
                true
            }
            CircuitState::Open | CircuitState::HalfOpen => {
                return Err(ProviderError::CircuitOpen(provider));
            }
        };
        Ok(CircuitPermit {
            tracker: self,
            provider,
            trial,
            settled: false,
        })
    }

    fn release_trial(&self, provider: ProviderId) {
        let mut state = self.slot(provider).lock();
        if state.circuit_state == CircuitState::HalfOpen {
            state.trial_in_flight = false;
        }
    }
}

impl Default for ProviderHealthTracker {
    fn default() -> Self {
        Self::new(HealthSettings::default())
    }
}

/// Admission to call a provider. Settle it with [`CircuitPermit::record`];
/// a trial permit dropped unsettled frees the trial slot again.
#[derive(Debug)]
pub struct CircuitPermit<'a> {
    tracker: &'a ProviderHealthTracker,
    provider: ProviderId,
    trial: bool,
    settled: bool,
}

impl CircuitPermit<'_> {
    pub fn provider(&self) -> ProviderId {
        self.provider
    }

    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn record(mut self, success: bool) {
        self.settled = true;
        self.tracker.settle(self.provider, success, self.trial);
    }
}

impl Drop for CircuitPermit<'_> {
    fn drop(&mut self) {
        if self.trial && !self.settled {
            self.tracker.release_trial(self.provider);
        }
    }
}
