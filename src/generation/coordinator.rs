//! Batch coordinator: fans a job out into per-question requests and collects
//! results. Concurrency, deadline and cancellation live here; routing stays in
//! the router.

use super::job::{GenerationJob, JobResult};
use super::router::SpecialistRouter;
use crate::config::QforgeConfig;
use crate::error::{ConfigurationError, GenerationError};
use crate::types::Tier;
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct BatchGenerationCoordinator {
    router: Arc<SpecialistRouter>,
    max_concurrency: usize,
    default_tier: Tier,
    deadline: Option<Duration>,
}

impl BatchGenerationCoordinator {
    const DEFAULT_MAX_CONCURRENCY: usize = 4;

    pub fn new(router: Arc<SpecialistRouter>) -> Self {
        Self {
            router,
            max_concurrency: Self::DEFAULT_MAX_CONCURRENCY,
            default_tier: Tier::Primary,
            deadline: None,
        }
    }

    pub fn from_config(
        config: &QforgeConfig,
        router: Arc<SpecialistRouter>,
    ) -> Result<Self, ConfigurationError> {
        let mut coordinator = Self::new(router)
            .with_max_concurrency(config.batch.max_concurrency)
            .with_default_tier(config.routing.default_tier()?);
        coordinator.deadline = config.batch.job_deadline();
        Ok(coordinator)
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn with_default_tier(mut self, tier: Tier) -> Self {
        self.default_tier = tier;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn router(&self) -> &Arc<SpecialistRouter> {
        &self.router
    }

    /// Run a job built from `requested_counts` with coordinator defaults.
    pub async fn run_counts(&self, requested_counts: BTreeMap<String, usize>) -> JobResult {
        self.run_job(GenerationJob::new(requested_counts)).await
    }

    pub async fn run_job(&self, job: GenerationJob) -> JobResult {
        self.run_job_with_cancel(job, CancellationToken::new()).await
    }

    /// Run `job` until every request settles, the deadline passes or `cancel` fires.
    ///
    /// Every request ends up in the result: a produced question, or a failure
    /// record whose kind tells a deadline apart from caller cancellation.
    pub async fn run_job_with_cancel(
        &self,
        job: GenerationJob,
        cancel: CancellationToken,
    ) -> JobResult {
        let started = Instant::now();
        let tier = job.tier.unwrap_or(self.default_tier);
        let concurrency = job.max_concurrency.unwrap_or(self.max_concurrency).max(1);
        let deadline = job.deadline.or(self.deadline);
        let job_cancel = cancel.child_token();

        let requests = job.build_requests(tier);
        let mut result = JobResult::new(&job);

        info!(
            job_id = %job.job_id,
            requests = requests.len(),
            question_types = job.requested_counts.len(),
            tier = %tier,
            concurrency,
            deadline_secs = deadline.map(|d| d.as_secs_f64()),
            "Starting generation job"
        );

        let router = self.router.as_ref();
        let token = &job_cancel;
        let outcomes = stream::iter(requests)
            .map(|mut request| async move {
                let outcome = if token.is_cancelled() {
                    Err(GenerationError::Cancelled)
                } else {
                    router.route_request(&mut request, token).await
                };
                (request, outcome)
            })
            .buffer_unordered(concurrency);
        tokio::pin!(outcomes);

        let deadline_timer = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline_timer);

        let mut deadline_hit = false;
        loop {
            tokio::select! {
                next = outcomes.next() => match next {
                    Some((request, outcome)) => result.record(request, outcome, deadline_hit),
                    None => break,
                },
                _ = &mut deadline_timer, if !deadline_hit => {
                    deadline_hit = true;
                    warn!(
                        job_id = %job.job_id,
                        completed = result.total_succeeded + result.total_failed,
                        "Job deadline exceeded, abandoning outstanding requests"
                    );
                    job_cancel.cancel();
                }
            }
        }

        result.elapsed_ms = started.elapsed().as_millis() as u64;
        result.deadline_exceeded = deadline_hit;
        result.cancelled = cancel.is_cancelled();

        info!(
            job_id = %result.job_id,
            succeeded = result.total_succeeded,
            failed = result.total_failed,
            elapsed_ms = result.elapsed_ms,
            deadline_exceeded = result.deadline_exceeded,
            cancelled = result.cancelled,
            "Generation job finished"
        );
        result
    }
}
