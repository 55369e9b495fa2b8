use crate::error::GenerationError;
use crate::provider::QuestionSpec;
use crate::types::{ModelId, ProviderId, Tier};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Request ID for correlating results with their question-type slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(u64);

impl RequestId {
    /// Generate the next request ID
    pub fn next() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        RequestId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Failed { message: String, transient: bool },
    /// The provider's circuit refused the call; no request was sent.
    Rejected,
    Cancelled,
}

/// One call (or refused call) against a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub provider: ProviderId,
    pub model: ModelId,
    /// Tier of the resolution this attempt served.
    pub tier: Tier,
    /// 1-based attempt number against this provider.
    pub attempt: u32,
    pub outcome: AttemptOutcome,
    pub at: DateTime<Utc>,
}

/// One question to produce.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub id: RequestId,
    pub question_type: String,
    pub ordinal: usize,
    pub tier_requested: Tier,
    pub attempt_history: Vec<AttemptRecord>,
}

impl GenerationRequest {
    pub fn new(question_type: impl Into<String>, ordinal: usize, tier: Tier) -> Self {
        Self {
            id: RequestId::next(),
            question_type: question_type.into(),
            ordinal,
            tier_requested: tier,
            attempt_history: Vec::new(),
        }
    }

    pub fn spec(&self) -> QuestionSpec {
        QuestionSpec {
            question_type: self.question_type.clone(),
            ordinal: self.ordinal,
        }
    }

    pub fn record_attempt(
        &mut self,
        provider: ProviderId,
        model: ModelId,
        tier: Tier,
        attempt: u32,
        outcome: AttemptOutcome,
    ) {
        self.attempt_history.push(AttemptRecord {
            provider,
            model,
            tier,
            attempt,
            outcome,
            at: Utc::now(),
        });
    }
}

/// A produced question with provider attribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedQuestion {
    pub request_id: RequestId,
    pub question_type: String,
    pub content: String,
    pub provider: ProviderId,
    pub model: ModelId,
    /// Tier that finally served the request.
    pub tier: Tier,
    /// Provider calls made for this request, including refused ones.
    pub attempts: usize,
}

/// A batch of questions submitted by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationJob {
    pub job_id: String,
    pub requested_counts: BTreeMap<String, usize>,
    /// Starting tier; the coordinator default applies when unset.
    pub tier: Option<Tier>,
    pub deadline: Option<Duration>,
    pub max_concurrency: Option<usize>,
}

impl GenerationJob {
    pub fn new(requested_counts: BTreeMap<String, usize>) -> Self {
        Self {
            job_id: format!("job-{}", Utc::now().format("%Y%m%dT%H%M%S%.3f")),
            requested_counts,
            tier: None,
            deadline: None,
            max_concurrency: None,
        }
    }

    pub fn from_counts<I, S>(counts: I) -> Self
    where
        I: IntoIterator<Item = (S, usize)>,
        S: Into<String>,
    {
        Self::new(counts.into_iter().map(|(t, n)| (t.into(), n)).collect())
    }

    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = job_id.into();
        self
    }

    pub fn with_tier(mut self, tier: Tier) -> Self {
        self.tier = Some(tier);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = Some(max_concurrency);
        self
    }

    pub fn total_requests(&self) -> usize {
        self.requested_counts.values().sum()
    }

    /// One request per question instance.
    pub fn build_requests(&self, tier: Tier) -> Vec<GenerationRequest> {
        self.requested_counts
            .iter()
            .flat_map(|(question_type, count)| {
                (0..*count).map(move |ordinal| GenerationRequest::new(question_type, ordinal, tier))
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    AllTiersExhausted,
    UnknownQuestionType,
    Cancelled,
    DeadlineExceeded,
}

/// Terminal failure of one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    pub request_id: RequestId,
    pub question_type: String,
    pub kind: FailureKind,
    pub message: String,
    pub attempts: Vec<AttemptRecord>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuestionTypeResult {
    pub requested: usize,
    pub produced: Vec<GeneratedQuestion>,
    pub failures: Vec<FailureRecord>,
}

/// Per-question-type breakdown of a finished job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: String,
    pub results: BTreeMap<String, QuestionTypeResult>,
    pub total_succeeded: usize,
    pub total_failed: usize,
    pub elapsed_ms: u64,
    pub deadline_exceeded: bool,
    pub cancelled: bool,
}

impl JobResult {
    pub fn new(job: &GenerationJob) -> Self {
        let results = job
            .requested_counts
            .iter()
            .map(|(question_type, count)| {
                (
                    question_type.clone(),
                    QuestionTypeResult {
                        requested: *count,
                        ..Default::default()
                    },
                )
            })
            .collect();
        Self {
            job_id: job.job_id.clone(),
            results,
            total_succeeded: 0,
            total_failed: 0,
            elapsed_ms: 0,
            deadline_exceeded: false,
            cancelled: false,
        }
    }

    /// File the outcome of `request` under its question type.
    pub fn record(
        &mut self,
        request: GenerationRequest,
        outcome: Result<GeneratedQuestion, GenerationError>,
        deadline_hit: bool,
    ) {
        let slot = self.results.entry(request.question_type.clone()).or_default();
        match outcome {
            Ok(question) => {
                self.total_succeeded += 1;
                slot.produced.push(question);
            }
            Err(error) => {
                self.total_failed += 1;
                let kind = match &error {
                    GenerationError::AllTiersExhausted { .. } => FailureKind::AllTiersExhausted,
                    GenerationError::UnknownQuestionType(_) => FailureKind::UnknownQuestionType,
                    GenerationError::Cancelled if deadline_hit => FailureKind::DeadlineExceeded,
                    GenerationError::Cancelled => FailureKind::Cancelled,
                };
                slot.failures.push(FailureRecord {
                    request_id: request.id,
                    question_type: request.question_type,
                    kind,
                    message: error.to_string(),
                    attempts: request.attempt_history,
                });
            }
        }
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }

    pub fn is_complete_success(&self) -> bool {
        self.total_failed == 0
    }

    /// Produced questions per serving provider.
    pub fn provider_attribution(&self) -> BTreeMap<ProviderId, usize> {
        let mut counts = BTreeMap::new();
        for question in self.results.values().flat_map(|r| r.produced.iter()) {
            *counts.entry(question.provider).or_insert(0) += 1;
        }
        counts
    }

    pub fn failures_by_kind(&self) -> BTreeMap<FailureKind, usize> {
        let mut counts = BTreeMap::new();
        for failure in self.results.values().flat_map(|r| r.failures.iter()) {
            *counts.entry(failure.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Render for the downstream persistence/judging stage.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
