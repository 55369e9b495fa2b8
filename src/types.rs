//! Core identifiers shared across the generation pipeline.

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The closed set of LLM providers a generator can be assigned to.
///
/// Declaration order is the default order used when resolution falls through
/// to "any available provider".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Anthropic,
    #[serde(rename = "openai")]
    OpenAI,
    Xai,
    Gemini,
}

impl ProviderId {
    pub const ALL: [ProviderId; 4] = [
        ProviderId::Anthropic,
        ProviderId::OpenAI,
        ProviderId::Xai,
        ProviderId::Gemini,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Anthropic => "anthropic",
            ProviderId::OpenAI => "openai",
            ProviderId::Xai => "xai",
            ProviderId::Gemini => "gemini",
        }
    }

    /// Model used when a resolution carries no model override.
    pub fn default_model(&self) -> ModelId {
        let name = match self {
            ProviderId::Anthropic => "claude-sonnet-4-5",
            ProviderId::OpenAI => "gpt-4.1",
            ProviderId::Xai => "grok-4",
            ProviderId::Gemini => "gemini-2.5-pro",
        };
        ModelId::new(name)
    }

    /// Base URL of the provider's HTTP API.
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            ProviderId::Anthropic => "https://api.anthropic.com/v1",
            ProviderId::OpenAI => "https://api.openai.com/v1",
            ProviderId::Xai => "https://api.x.ai/v1",
            ProviderId::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai",
        }
    }

    /// Environment variable consulted for the API key when config names none.
    pub fn default_api_key_env(&self) -> &'static str {
        match self {
            ProviderId::Anthropic => "ANTHROPIC_API_KEY",
            ProviderId::OpenAI => "OPENAI_API_KEY",
            ProviderId::Xai => "XAI_API_KEY",
            ProviderId::Gemini => "GEMINI_API_KEY",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" => Ok(ProviderId::Anthropic),
            "openai" => Ok(ProviderId::OpenAI),
            "xai" => Ok(ProviderId::Xai),
            "gemini" | "google" => Ok(ProviderId::Gemini),
            _ => Err(ConfigurationError::UnknownProvider(s.to_string())),
        }
    }
}

/// Opaque model name as understood by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(String);

impl ModelId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModelId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Priority level of provider selection.
///
/// Tiers are ordered: `Primary` escalates to `Fallback`, which escalates to
/// `Any`. `Any` is the last tier.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Primary,
    Fallback,
    Any,
}

impl Tier {
    /// The tier tried after this one fails, if any.
    pub fn next(self) -> Option<Tier> {
        match self {
            Tier::Primary => Some(Tier::Fallback),
            Tier::Fallback => Some(Tier::Any),
            Tier::Any => None,
        }
    }

    /// This tier followed by every lower tier.
    pub fn chain(self) -> &'static [Tier] {
        match self {
            Tier::Primary => &[Tier::Primary, Tier::Fallback, Tier::Any],
            Tier::Fallback => &[Tier::Fallback, Tier::Any],
            Tier::Any => &[Tier::Any],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Primary => "primary",
            Tier::Fallback => "fallback",
            Tier::Any => "any",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "primary" => Ok(Tier::Primary),
            "fallback" => Ok(Tier::Fallback),
            "any" => Ok(Tier::Any),
            other => Err(ConfigurationError::Invalid(format!(
                "Unknown tier '{}' (expected primary, fallback or any)",
                other
            ))),
        }
    }
}
