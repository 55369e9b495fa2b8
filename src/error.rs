//! Error types for the question generation pipeline.

use crate::generation::job::AttemptRecord;
use crate::types::ProviderId;
use std::time::Duration;
use thiserror::Error;

/// Startup-fatal configuration errors.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Generator '{0}': fallback_model is set but fallback is not")]
    FallbackModelWithoutFallback(String),

    #[error("Generator '{0}': {1}")]
    InvalidGenerator(String, String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Configuration validation failed:\n{0}")]
    Validation(String),

    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

/// Per-request resolution failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("Unknown question type: {0}")]
    UnknownQuestionType(String),

    #[error("No provider available for question type '{0}'")]
    NoProviderAvailable(String),
}

/// Failures reported by a provider client or by the circuit guarding it.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("Provider request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Provider rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Provider server error: {0}")]
    Server(String),

    #[error("Provider connection error: {0}")]
    Connection(String),

    #[error("Provider authentication failed: {0}")]
    Auth(String),

    #[error("Provider rejected request: {0}")]
    InvalidRequest(String),

    #[error("Provider returned malformed response: {0}")]
    MalformedResponse(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(ProviderId),

    #[error("Circuit open for provider {0}")]
    CircuitOpen(ProviderId),
}

impl ProviderError {
    /// Timeouts, 5xx, rate limits and connection failures are worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::Timeout(_)
                | ProviderError::RateLimited(_)
                | ProviderError::Server(_)
                | ProviderError::Connection(_)
        )
    }

    /// Map an HTTP status and body to the matching error class.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => ProviderError::Auth(body),
            408 => ProviderError::Timeout(Duration::ZERO),
            429 => ProviderError::RateLimited(body),
            500..=599 => ProviderError::Server(format!("status {}: {}", status, body)),
            _ => ProviderError::InvalidRequest(format!("status {}: {}", status, body)),
        }
    }
}

/// Terminal per-request failures, recorded in the job result.
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error(
        "All tiers exhausted for question type '{question_type}' after {} attempts",
        attempts.len()
    )]
    AllTiersExhausted {
        question_type: String,
        attempts: Vec<AttemptRecord>,
    },

    #[error("Unknown question type: {0}")]
    UnknownQuestionType(String),

    #[error("Generation cancelled")]
    Cancelled,
}
