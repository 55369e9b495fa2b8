//! Retry with exponential backoff and jitter for transient provider failures.

use crate::config::RetryConfig;
use crate::error::ProviderError;
use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts per provider, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound of the random jitter, as a fraction of the delay.
    pub jitter_fraction: f64,
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        jitter_fraction: f64,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
            jitter_fraction: jitter_fraction.clamp(0.0, 1.0),
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
            config.jitter_fraction,
        )
    }

    /// A single attempt, never retried.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO, 0.0)
    }

    /// Whether attempt number `attempt` (1-based) failing with `error` earns another try.
    pub fn should_retry(&self, attempt: u32, error: &ProviderError) -> bool {
        attempt < self.max_attempts && error.is_transient()
    }

    /// Backoff before retry `attempt` (1 = first retry), without jitter:
    /// `min(base * 2^(attempt-1), max_delay)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Backoff plus uniform jitter in `[0, backoff * jitter_fraction]`.
    pub fn delay_before_attempt(&self, attempt: u32) -> Duration {
        let delay = self.backoff(attempt);
        let max_jitter = delay.as_secs_f64() * self.jitter_fraction;
        if max_jitter <= 0.0 {
            return delay;
        }
        let jitter = rand::thread_rng().gen_range(0.0..=max_jitter);
        delay + Duration::from_secs_f64(jitter)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
