//! Model Provider Abstraction
//!
//! Every provider is driven through one capability, [`ProviderClient::generate`],
//! so routing and resilience code treats vendors polymorphically. HTTP clients
//! for the supported vendors live in [`clients`]; tests register scripted clients
//! in a [`ProviderRegistry`] instead.

use crate::config::{ProviderSettings, QforgeConfig};
use crate::error::{ConfigurationError, ProviderError};
use crate::types::{ModelId, ProviderId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub mod clients;

pub use clients::{AnthropicClient, OpenAICompatibleClient};

/// What to generate. Prompt wording is the client's concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionSpec {
    pub question_type: String,
    /// Position of this question within its type in the job.
    pub ordinal: usize,
}

/// Raw provider output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub content: String,
    /// Model that actually served the request.
    pub model: ModelId,
}

/// Uniform generation capability of a provider.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    fn provider(&self) -> ProviderId;

    /// Model used when the caller passes no override.
    fn default_model(&self) -> &ModelId;

    async fn generate(
        &self,
        model: Option<&ModelId>,
        spec: &QuestionSpec,
    ) -> Result<Question, ProviderError>;
}

/// Provider factory for creating HTTP provider clients
pub struct ProviderFactory;

impl ProviderFactory {
    pub fn create_client(
        provider: ProviderId,
        settings: &ProviderSettings,
        api_key: String,
        request_timeout: Duration,
    ) -> Result<Arc<dyn ProviderClient>, ConfigurationError> {
        let default_model = settings
            .default_model
            .as_deref()
            .map(ModelId::new)
            .unwrap_or_else(|| provider.default_model());
        let endpoint = settings
            .endpoint
            .clone()
            .unwrap_or_else(|| provider.default_endpoint().to_string());

        match provider {
            ProviderId::Anthropic => Ok(Arc::new(AnthropicClient::new(
                default_model,
                api_key,
                endpoint,
                request_timeout,
            )?)),
            ProviderId::OpenAI | ProviderId::Xai | ProviderId::Gemini => {
                Ok(Arc::new(OpenAICompatibleClient::new(
                    provider,
                    default_model,
                    api_key,
                    endpoint,
                    request_timeout,
                )?))
            }
        }
    }
}

/// Clients by provider. Providers without a client are never dispatched to.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    clients: BTreeMap<ProviderId, Arc<dyn ProviderClient>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build HTTP clients for every provider that has credentials.
    ///
    /// Each client's HTTP timeout is the configured per-attempt timeout.
    pub fn from_config(config: &QforgeConfig) -> Result<Self, ConfigurationError> {
        let request_timeout = config.batch.attempt_timeout();
        let mut registry = Self::new();
        for provider in ProviderId::ALL {
            let settings = config
                .provider_settings(provider)
                .cloned()
                .unwrap_or_default();
            match settings.resolve_api_key(provider) {
                Some(api_key) => {
                    let client = ProviderFactory::create_client(
                        provider,
                        &settings,
                        api_key,
                        request_timeout,
                    )?;
                    registry.register(client);
                }
                None => {
                    debug!(provider = %provider, "No API key found, provider disabled");
                }
            }
        }
        info!(
            providers = ?registry.providers(),
            "Provider registry initialized"
        );
        Ok(registry)
    }

    /// Register a client, replacing any previous client for the same provider.
    pub fn register(&mut self, client: Arc<dyn ProviderClient>) {
        self.clients.insert(client.provider(), client);
    }

    pub fn with_client(mut self, client: Arc<dyn ProviderClient>) -> Self {
        self.register(client);
        self
    }

    pub fn get(&self, provider: ProviderId) -> Option<Arc<dyn ProviderClient>> {
        self.clients.get(&provider).cloned()
    }

    pub fn get_or_error(
        &self,
        provider: ProviderId,
    ) -> Result<Arc<dyn ProviderClient>, ProviderError> {
        self.get(provider)
            .ok_or(ProviderError::NotConfigured(provider))
    }

    /// Providers with a registered client.
    pub fn providers(&self) -> BTreeSet<ProviderId> {
        self.clients.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.providers())
            .finish()
    }
}
