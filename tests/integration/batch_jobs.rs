//! Batch jobs end to end: partial failure, circuit trips mid-batch, deadlines.

use super::support::{self, ScriptedClient, Step};
use qforge::error::ProviderError;
use qforge::generation::{BatchGenerationCoordinator, FailureKind, GenerationJob};
use qforge::resilience::{CircuitState, HealthSettings, RetryPolicy};
use qforge::types::{ProviderId, Tier};
use std::sync::Arc;
use std::time::Duration;

fn settings(threshold: u32) -> HealthSettings {
    HealthSettings::new(threshold, Duration::from_secs(300))
}

#[tokio::test(start_paused = true)]
async fn primary_circuit_trips_mid_batch_and_fallback_serves_the_rest() {
    let xai = ScriptedClient::from_fn(ProviderId::Xai, |call| {
        if call < 2 {
            Step::Succeed
        } else {
            Step::Fail(ProviderError::Server("503 overloaded".to_string()))
        }
    });
    let anthropic = ScriptedClient::healthy(ProviderId::Anthropic);
    let router = Arc::new(support::router(
        &[xai.clone(), anthropic.clone()],
        settings(3),
        RetryPolicy::no_retry(),
    ));
    let coordinator = BatchGenerationCoordinator::new(router.clone()).with_max_concurrency(1);

    let result = coordinator
        .run_job(GenerationJob::from_counts([("spatial", 10)]))
        .await;

    assert_eq!(result.total_succeeded, 10);
    assert_eq!(result.total_failed, 0);
    assert!(result.is_complete_success());

    let attribution = result.provider_attribution();
    assert_eq!(attribution.get(&ProviderId::Xai), Some(&2));
    assert_eq!(attribution.get(&ProviderId::Anthropic), Some(&8));

    // Two successes plus three failures; the open circuit stops further calls.
    assert_eq!(xai.calls(), 5);
    assert_eq!(
        router.health().circuit_state(ProviderId::Xai),
        CircuitState::Open
    );

    let fallback_served: Vec<_> = result.results["spatial"]
        .produced
        .iter()
        .filter(|q| q.provider == ProviderId::Anthropic)
        .collect();
    assert!(fallback_served
        .iter()
        .all(|q| q.model.as_str() == "claude-sonnet-4-5" && q.tier == Tier::Fallback));
}

#[tokio::test(start_paused = true)]
async fn all_circuits_open_reports_exhaustion_within_deadline() {
    let clients: Vec<_> = ProviderId::ALL
        .into_iter()
        .map(ScriptedClient::healthy)
        .collect();
    let router = Arc::new(support::router(&clients, settings(1), RetryPolicy::no_retry()));
    for provider in ProviderId::ALL {
        router.health().record_outcome(provider, false);
    }
    let coordinator = BatchGenerationCoordinator::new(router).with_deadline(Duration::from_secs(5));

    let result = coordinator
        .run_job(GenerationJob::from_counts([("logic", 1)]))
        .await;

    assert_eq!(result.total_succeeded, 0);
    assert_eq!(result.total_failed, 1);
    let failure = &result.results["logic"].failures[0];
    assert_eq!(failure.kind, FailureKind::AllTiersExhausted);
    assert!(failure.attempts.is_empty());
    assert!(!result.deadline_exceeded);
    assert!(result.elapsed() < Duration::from_secs(5));
    assert!(clients.iter().all(|c| c.calls() == 0));
}

#[tokio::test(start_paused = true)]
async fn deadline_abandons_hanging_requests_and_keeps_completed_ones() {
    let xai = ScriptedClient::hanging(ProviderId::Xai);
    let openai = ScriptedClient::from_fn(ProviderId::OpenAI, |_| {
        Step::SucceedAfter(Duration::from_millis(500))
    });
    let router = Arc::new(
        support::router(&[xai.clone(), openai], settings(3), RetryPolicy::no_retry())
            .with_attempt_timeout(Duration::from_secs(600)),
    );
    let coordinator = BatchGenerationCoordinator::new(router.clone()).with_max_concurrency(4);

    // math hangs on xai while logic completes on openai.
    let job = GenerationJob::from_counts([("math", 3), ("logic", 2)])
        .with_deadline(Duration::from_secs(2));
    let result = coordinator.run_job(job).await;

    assert!(result.deadline_exceeded);
    assert!(!result.cancelled);
    assert_eq!(result.total_succeeded + result.total_failed, 5);
    assert_eq!(result.results["logic"].produced.len(), 2);
    assert_eq!(result.results["math"].failures.len(), 3);
    assert!(result.results["math"]
        .failures
        .iter()
        .all(|f| f.kind == FailureKind::DeadlineExceeded));
    assert!(result.elapsed() < Duration::from_secs(3));

    // Abandoned calls are not counted against the provider.
    assert_eq!(router.health().snapshot(ProviderId::Xai).consecutive_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn failures_are_reported_per_question_type() {
    let openai = ScriptedClient::from_fn(ProviderId::OpenAI, |_| {
        Step::Fail(ProviderError::Auth("invalid api key".to_string()))
    });
    let anthropic = ScriptedClient::healthy(ProviderId::Anthropic);
    let router = Arc::new(support::router(
        &[openai.clone(), anthropic],
        settings(50),
        support::fast_retry(3),
    ));
    let coordinator = BatchGenerationCoordinator::new(router);

    let job = GenerationJob::from_counts([("logic", 2), ("verbal", 2), ("history", 1)]);
    let result = coordinator.run_job(job).await;

    // logic has no fallback, so Any picks anthropic after openai fails fatally.
    assert_eq!(result.results["logic"].produced.len(), 2);
    assert!(result.results["logic"]
        .produced
        .iter()
        .all(|q| q.provider == ProviderId::Anthropic && q.tier == Tier::Any));
    // Fatal errors are not retried.
    assert_eq!(openai.calls(), 2);

    assert_eq!(result.results["verbal"].produced.len(), 2);
    let history = &result.results["history"];
    assert_eq!(history.failures.len(), 1);
    assert_eq!(history.failures[0].kind, FailureKind::UnknownQuestionType);
    assert!(history.failures[0].message.contains("history"));

    let by_kind = result.failures_by_kind();
    assert_eq!(by_kind.len(), 1);
    assert_eq!(result.total_failed, 1);
}

#[tokio::test(start_paused = true)]
async fn job_tier_override_skips_primary() {
    let xai = ScriptedClient::healthy(ProviderId::Xai);
    let anthropic = ScriptedClient::healthy(ProviderId::Anthropic);
    let router = Arc::new(support::router(
        &[xai.clone(), anthropic.clone()],
        settings(3),
        RetryPolicy::no_retry(),
    ));
    let coordinator = BatchGenerationCoordinator::new(router);

    let job = GenerationJob::from_counts([("math", 3)]).with_tier(Tier::Fallback);
    let result = coordinator.run_job(job).await;

    assert_eq!(result.total_succeeded, 3);
    assert_eq!(xai.calls(), 0);
    assert_eq!(anthropic.calls(), 3);
    assert!(anthropic
        .models_seen()
        .iter()
        .all(|m| m.as_ref().map(|m| m.as_str()) == Some("claude-sonnet-4-5")));
}

#[tokio::test(start_paused = true)]
async fn job_result_serializes_for_downstream() {
    let router = Arc::new(support::router(
        &[ScriptedClient::healthy(ProviderId::OpenAI)],
        settings(3),
        RetryPolicy::no_retry(),
    ));
    let coordinator = BatchGenerationCoordinator::new(router);

    let result = coordinator
        .run_job(GenerationJob::from_counts([("logic", 1)]).with_job_id("job-export"))
        .await;
    let value: serde_json::Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();

    assert_eq!(value["job_id"], "job-export");
    assert_eq!(value["total_succeeded"], 1);
    let produced = &value["results"]["logic"]["produced"][0];
    assert_eq!(produced["provider"], "openai");
    assert_eq!(produced["model"], "gpt-4.1");
    assert_eq!(produced["tier"], "primary");
}
