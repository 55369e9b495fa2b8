//! Configuration System
//!
//! Layered configuration for generator assignments, provider credentials and the
//! resilience knobs (circuit breaker, retry, batch). Loaded once at startup and
//! validated as a whole; any violation fails startup rather than individual requests.

use crate::assignment::GeneratorAssignment;
use crate::error::ConfigurationError;
use crate::logging::LoggingConfig;
use crate::types::{ProviderId, Tier};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QforgeConfig {
    /// Question type -> generator assignment
    #[serde(default)]
    pub generators: BTreeMap<String, GeneratorConfig>,

    /// Provider name -> connection settings
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderSettings>,

    #[serde(default)]
    pub routing: RoutingConfig,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub batch: BatchConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// One row of the generator assignment table, as written in config files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub fallback: Option<String>,
    #[serde(default)]
    pub fallback_model: Option<String>,
    #[serde(default)]
    pub rationale: String,
}

impl GeneratorConfig {
    /// Convert into a typed assignment, rejecting unknown providers and
    /// a fallback model without a fallback provider.
    pub fn to_assignment(
        &self,
        question_type: &str,
    ) -> Result<GeneratorAssignment, ConfigurationError> {
        if question_type.trim().is_empty() {
            return Err(ConfigurationError::Invalid(
                "Generator question type cannot be empty".to_string(),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigurationError::InvalidGenerator(
                question_type.to_string(),
                "model cannot be empty".to_string(),
            ));
        }

        let primary_provider: ProviderId = self.provider.parse()?;
        let fallback_provider = self
            .fallback
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .map(str::parse::<ProviderId>)
            .transpose()?;

        let fallback_model = self
            .fallback_model
            .as_deref()
            .filter(|name| !name.trim().is_empty());
        if fallback_model.is_some() && fallback_provider.is_none() {
            return Err(ConfigurationError::FallbackModelWithoutFallback(
                question_type.to_string(),
            ));
        }

        Ok(GeneratorAssignment {
            question_type: question_type.to_string(),
            primary_provider,
            primary_model: self.model.trim().into(),
            fallback_provider,
            fallback_model: fallback_model.map(|m| m.trim().into()),
            rationale: self.rationale.clone(),
        })
    }
}

/// Connection settings for one provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Inline API key (prefer `api_key_env`)
    #[serde(default)]
    pub api_key: Option<String>,
    /// Environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Override for the provider's base URL
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Model used when a resolution carries no model override
    #[serde(default)]
    pub default_model: Option<String>,
}

impl ProviderSettings {
    /// Resolve the API key from inline config, the named env var, or the
    /// provider's conventional env var, in that order.
    pub fn resolve_api_key(&self, provider: ProviderId) -> Option<String> {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.is_empty()) {
            return Some(key.clone());
        }
        let env_name = self
            .api_key_env
            .as_deref()
            .unwrap_or_else(|| provider.default_api_key_env());
        std::env::var(env_name).ok().filter(|k| !k.is_empty())
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(endpoint) = &self.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(format!("Invalid endpoint URL: {}", endpoint));
            }
        }
        if let Some(model) = &self.default_model {
            if model.trim().is_empty() {
                return Err("default_model cannot be empty".to_string());
            }
        }
        Ok(())
    }
}

/// Tier resolution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Provider order for the "any available provider" tier
    #[serde(default = "default_provider_order")]
    pub provider_order: Vec<String>,

    /// Starting tier when the caller does not force one
    #[serde(default = "default_tier")]
    pub default_tier: String,
}

fn default_provider_order() -> Vec<String> {
    ProviderId::ALL.iter().map(|p| p.as_str().to_string()).collect()
}

fn default_tier() -> String {
    Tier::Primary.as_str().to_string()
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            provider_order: default_provider_order(),
            default_tier: default_tier(),
        }
    }
}

impl RoutingConfig {
    pub fn provider_order(&self) -> Result<Vec<ProviderId>, ConfigurationError> {
        if self.provider_order.is_empty() {
            return Ok(ProviderId::ALL.to_vec());
        }
        let mut seen = BTreeSet::new();
        let mut order = Vec::with_capacity(self.provider_order.len());
        for name in &self.provider_order {
            let provider: ProviderId = name.parse()?;
            if !seen.insert(provider) {
                return Err(ConfigurationError::Invalid(format!(
                    "Provider '{}' listed twice in routing.provider_order",
                    provider
                )));
            }
            order.push(provider);
        }
        Ok(order)
    }

    pub fn default_tier(&self) -> Result<Tier, ConfigurationError> {
        self.default_tier.parse()
    }
}

/// Circuit breaker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Consecutive failures before a provider's circuit opens
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Seconds an open circuit waits before admitting a trial request
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    /// Cooldown growth after a failed trial (1.0 keeps it constant)
    #[serde(default = "default_cooldown_multiplier")]
    pub cooldown_multiplier: f64,
    /// Upper bound for the grown cooldown
    #[serde(default = "default_max_cooldown_secs")]
    pub max_cooldown_secs: u64,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_cooldown_secs() -> u64 {
    60
}

fn default_cooldown_multiplier() -> f64 {
    2.0
}

fn default_max_cooldown_secs() -> u64 {
    600
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_secs: default_cooldown_secs(),
            cooldown_multiplier: default_cooldown_multiplier(),
            max_cooldown_secs: default_max_cooldown_secs(),
        }
    }
}

impl HealthConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn max_cooldown(&self) -> Duration {
        Duration::from_secs(self.max_cooldown_secs.max(self.cooldown_secs))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold == 0 {
            return Err("health.failure_threshold must be at least 1".to_string());
        }
        if !self.cooldown_multiplier.is_finite() || self.cooldown_multiplier < 1.0 {
            return Err("health.cooldown_multiplier must be >= 1.0".to_string());
        }
        Ok(())
    }
}

/// Retry settings for transient provider failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts per provider, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Jitter added on top of the delay, as a fraction of it
    #[serde(default = "default_jitter_fraction")]
    pub jitter_fraction: f64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_jitter_fraction() -> f64 {
    0.2
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_fraction: default_jitter_fraction(),
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("retry.max_attempts must be at least 1".to_string());
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err("retry.max_delay_ms must be >= retry.base_delay_ms".to_string());
        }
        if !(0.0..=1.0).contains(&self.jitter_fraction) {
            return Err("retry.jitter_fraction must be within [0, 1]".to_string());
        }
        Ok(())
    }
}

/// Batch dispatch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Maximum requests in flight per job
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Timeout for a single provider call attempt
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,
    /// Whole-job deadline (unset: no deadline)
    #[serde(default)]
    pub job_deadline_secs: Option<u64>,
}

fn default_max_concurrency() -> usize {
    4
}

fn default_attempt_timeout_secs() -> u64 {
    120
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            attempt_timeout_secs: default_attempt_timeout_secs(),
            job_deadline_secs: None,
        }
    }
}

impl BatchConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    pub fn job_deadline(&self) -> Option<Duration> {
        self.job_deadline_secs.map(Duration::from_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrency == 0 {
            return Err("batch.max_concurrency must be at least 1".to_string());
        }
        if self.attempt_timeout_secs == 0 {
            return Err("batch.attempt_timeout_secs must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    Generator(String, String),
    Provider(String, String),
    Routing(String),
    System(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Generator(name, msg) => write!(f, "Generator '{}': {}", name, msg),
            ValidationError::Provider(name, msg) => write!(f, "Provider '{}': {}", name, msg),
            ValidationError::Routing(msg) => write!(f, "Routing: {}", msg),
            ValidationError::System(msg) => write!(f, "System: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl QforgeConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        for (question_type, generator) in &self.generators {
            if let Err(e) = generator.to_assignment(question_type) {
                errors.push(ValidationError::Generator(question_type.clone(), e.to_string()));
            }
        }

        for (name, settings) in &self.providers {
            if let Err(e) = name.parse::<ProviderId>() {
                errors.push(ValidationError::Provider(name.clone(), e.to_string()));
            }
            if let Err(e) = settings.validate() {
                errors.push(ValidationError::Provider(name.clone(), e));
            }
        }

        if let Err(e) = self.routing.provider_order() {
            errors.push(ValidationError::Routing(e.to_string()));
        }
        if let Err(e) = self.routing.default_tier() {
            errors.push(ValidationError::Routing(e.to_string()));
        }

        for result in [
            self.health.validate(),
            self.retry.validate(),
            self.batch.validate(),
        ] {
            if let Err(e) = result {
                errors.push(ValidationError::System(e));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate, folding every problem into one startup error.
    pub fn ensure_valid(&self) -> Result<(), ConfigurationError> {
        self.validate().map_err(|errors| {
            let error_msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ConfigurationError::Validation(error_msgs.join("\n"))
        })
    }

    /// Settings for `provider`, looked up by its config name.
    pub fn provider_settings(&self, provider: ProviderId) -> Option<&ProviderSettings> {
        self.providers
            .iter()
            .find(|(name, _)| name.parse::<ProviderId>().ok() == Some(provider))
            .map(|(_, settings)| settings)
    }
}
