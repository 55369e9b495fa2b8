//! Tier-by-tier routing of a single generation request.
//!
//! The router asks the resolver for a provider, drives the call through the
//! circuit breaker and retry policy, and on terminal failure moves one tier down
//! the chain. A tier is never revisited, and a provider that already failed the
//! request is excluded from later resolutions.

use super::job::{AttemptOutcome, GeneratedQuestion, GenerationRequest};
use crate::config::QforgeConfig;
use crate::error::{ConfigurationError, GenerationError, ProviderError, ResolutionError};
use crate::provider::{ProviderRegistry, Question};
use crate::resilience::{ProviderHealthTracker, RetryPolicy};
use crate::resolver::{GeneratorAssignmentResolver, Resolution};
use crate::types::{ProviderId, Tier};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(120);

/// Why a provider stopped serving a request.
#[derive(Debug)]
enum DispatchError {
    Provider(ProviderError),
    Cancelled,
}

/// Routes requests to providers with retry, circuit breaking and tier escalation.
#[derive(Debug, Clone)]
pub struct SpecialistRouter {
    resolver: Arc<GeneratorAssignmentResolver>,
    health: Arc<ProviderHealthTracker>,
    retry: RetryPolicy,
    registry: Arc<ProviderRegistry>,
    attempt_timeout: Duration,
}

impl SpecialistRouter {
    pub fn new(
        resolver: Arc<GeneratorAssignmentResolver>,
        health: Arc<ProviderHealthTracker>,
        retry: RetryPolicy,
        registry: Arc<ProviderRegistry>,
    ) -> Self {
        Self {
            resolver,
            health,
            retry,
            registry,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }

    pub fn from_config(
        config: &QforgeConfig,
        registry: Arc<ProviderRegistry>,
    ) -> Result<Self, ConfigurationError> {
        let resolver = GeneratorAssignmentResolver::from_config(config)?;
        let router = Self::new(
            Arc::new(resolver),
            Arc::new(ProviderHealthTracker::from_config(&config.health)),
            RetryPolicy::from_config(&config.retry),
            registry,
        )
        .with_attempt_timeout(config.batch.attempt_timeout());
        Ok(router)
    }

    pub fn with_attempt_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.attempt_timeout = attempt_timeout;
        self
    }

    pub fn health(&self) -> &Arc<ProviderHealthTracker> {
        &self.health
    }

    pub fn resolver(&self) -> &GeneratorAssignmentResolver {
        &self.resolver
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Produce one question of `question_type`, starting at `tier`.
    pub async fn route_and_generate(
        &self,
        question_type: &str,
        tier: Tier,
    ) -> Result<GeneratedQuestion, GenerationError> {
        let mut request = GenerationRequest::new(question_type, 0, tier);
        self.route_request(&mut request, &CancellationToken::new())
            .await
    }

    /// Route `request`, appending every provider call to its attempt history.
    pub async fn route_request(
        &self,
        request: &mut GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GeneratedQuestion, GenerationError> {
        let mut tier = request.tier_requested;
        let mut failed: BTreeSet<ProviderId> = BTreeSet::new();

        loop {
            if cancel.is_cancelled() {
                return Err(GenerationError::Cancelled);
            }

            let available = self.candidates(&failed);
            let resolution = match self
                .resolver
                .resolve(&request.question_type, tier, &available)
            {
                Ok(resolution) => resolution,
                Err(ResolutionError::UnknownQuestionType(question_type)) => {
                    return Err(GenerationError::UnknownQuestionType(question_type));
                }
                Err(ResolutionError::NoProviderAvailable(_)) => break,
            };

            match self.dispatch(request, &resolution, cancel).await {
                Ok(question) => {
                    return Ok(GeneratedQuestion {
                        request_id: request.id,
                        question_type: request.question_type.clone(),
                        content: question.content,
                        provider: resolution.provider,
                        model: question.model,
                        tier: resolution.satisfied_by,
                        attempts: request.attempt_history.len(),
                    });
                }
                Err(DispatchError::Cancelled) => return Err(GenerationError::Cancelled),
                Err(DispatchError::Provider(error)) => {
                    failed.insert(resolution.provider);
                    match resolution.satisfied_by.next() {
                        Some(next) => {
                            warn!(
                                request_id = %request.id,
                                question_type = %request.question_type,
                                provider = %resolution.provider,
                                failed_tier = %resolution.satisfied_by,
                                next_tier = %next,
                                error = %error,
                                "Provider failed, escalating tier"
                            );
                            tier = next;
                        }
                        None => {
                            warn!(
                                request_id = %request.id,
                                question_type = %request.question_type,
                                provider = %resolution.provider,
                                error = %error,
                                "Provider failed on last tier"
                            );
                            break;
                        }
                    }
                }
            }
        }

        Err(GenerationError::AllTiersExhausted {
            question_type: request.question_type.clone(),
            attempts: request.attempt_history.clone(),
        })
    }

    /// Circuit-available providers with a client, excluding those already failed.
    fn candidates(&self, failed: &BTreeSet<ProviderId>) -> BTreeSet<ProviderId> {
        let registered = self.registry.providers();
        self.health
            .available_providers()
            .into_iter()
            .filter(|provider| registered.contains(provider) && !failed.contains(provider))
            .collect()
    }

    /// Call the resolved provider until it succeeds, fails terminally or is cancelled.
    async fn dispatch(
        &self,
        request: &mut GenerationRequest,
        resolution: &Resolution,
        cancel: &CancellationToken,
    ) -> Result<Question, DispatchError> {
        let provider = resolution.provider;
        let tier = resolution.satisfied_by;
        let client = self
            .registry
            .get_or_error(provider)
            .map_err(DispatchError::Provider)?;
        let model = resolution
            .model
            .clone()
            .unwrap_or_else(|| client.default_model().clone());
        let spec = request.spec();

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return Err(DispatchError::Cancelled);
            }

            let permit = match self.health.try_acquire(provider) {
                Ok(permit) => permit,
                Err(error) => {
                    request.record_attempt(
                        provider,
                        model.clone(),
                        tier,
                        attempt,
                        AttemptOutcome::Rejected,
                    );
                    return Err(DispatchError::Provider(error));
                }
            };

            debug!(
                request_id = %request.id,
                provider = %provider,
                model = %model,
                attempt,
                trial = permit.is_trial(),
                "Dispatching generation request"
            );

            let call = tokio::time::timeout(
                self.attempt_timeout,
                client.generate(resolution.model.as_ref(), &spec),
            );
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    request.record_attempt(
                        provider,
                        model.clone(),
                        tier,
                        attempt,
                        AttemptOutcome::Cancelled,
                    );
                    return Err(DispatchError::Cancelled);
                }
                result = call => result
                    .unwrap_or_else(|_| Err(ProviderError::Timeout(self.attempt_timeout))),
            };

            let error = match result {
                Ok(question) => {
                    permit.record(true);
                    request.record_attempt(
                        provider,
                        model.clone(),
                        tier,
                        attempt,
                        AttemptOutcome::Success,
                    );
                    return Ok(question);
                }
                Err(error) => error,
            };

            permit.record(false);
            request.record_attempt(
                provider,
                model.clone(),
                tier,
                attempt,
                AttemptOutcome::Failed {
                    message: error.to_string(),
                    transient: error.is_transient(),
                },
            );

            if !self.retry.should_retry(attempt, &error) {
                return Err(DispatchError::Provider(error));
            }

            let delay = self.retry.delay_before_attempt(attempt);
            debug!(
                request_id = %request.id,
                provider = %provider,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Transient failure, retrying after backoff"
            );
            tokio::select! {
                _ = cancel.cancelled() => return Err(DispatchError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
