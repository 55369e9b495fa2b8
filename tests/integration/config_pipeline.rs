//! From a config file on disk to a finished batch job.

use super::support::ScriptedClient;
use qforge::assignment::AssignmentTable;
use qforge::config::ConfigLoader;
use qforge::error::ConfigurationError;
use qforge::generation::{BatchGenerationCoordinator, GenerationJob, SpecialistRouter};
use qforge::provider::ProviderRegistry;
use qforge::types::{ProviderId, Tier};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const GENERATORS_TOML: &str = r#"
[generators.math]
provider = "xai"
model = "grok-4"
fallback = "anthropic"
fallback_model = "claude-sonnet-4-5"
rationale = "Strong at multi-step arithmetic"

[generators.verbal]
provider = "anthropic"
model = "claude-sonnet-4-5"
fallback = "openai"

[routing]
provider_order = ["gemini", "openai", "anthropic", "xai"]
default_tier = "fallback"

[health]
failure_threshold = 2
cooldown_secs = 30

[retry]
max_attempts = 2
base_delay_ms = 50
max_delay_ms = 200
jitter_fraction = 0.0

[batch]
max_concurrency = 2
attempt_timeout_secs = 10
job_deadline_secs = 60
"#;

fn write_config(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_generator_table_loads_from_toml() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_config(&temp_dir, "qforge.toml", GENERATORS_TOML);

    let config = ConfigLoader::load_from_file(&path).unwrap();
    let table = AssignmentTable::from_config(&config).unwrap();

    let math = table.get("math").unwrap();
    assert_eq!(math.primary_provider, ProviderId::Xai);
    assert_eq!(math.fallback_provider, Some(ProviderId::Anthropic));
    assert_eq!(math.rationale, "Strong at multi-step arithmetic");

    let verbal = table.get("verbal").unwrap();
    assert_eq!(verbal.fallback_provider, Some(ProviderId::OpenAI));
    assert!(verbal.fallback_model.is_none());

    assert_eq!(
        config.routing.provider_order().unwrap(),
        vec![ProviderId::Gemini, ProviderId::OpenAI, ProviderId::Anthropic, ProviderId::Xai]
    );
    assert_eq!(config.routing.default_tier().unwrap(), Tier::Fallback);
    assert_eq!(config.batch.job_deadline(), Some(Duration::from_secs(60)));
}

#[test]
fn test_unknown_provider_fails_startup() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_config(
        &temp_dir,
        "qforge.yaml",
        "generators:\n  math:\n    provider: mistral\n    model: large\n",
    );

    let err = ConfigLoader::load_from_file(&path).unwrap_err();
    assert!(matches!(err, ConfigurationError::Validation(_)));
    assert!(err.to_string().contains("mistral"));
}

#[test]
fn test_fallback_model_without_fallback_fails_startup() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_config(
        &temp_dir,
        "qforge.toml",
        r#"
[generators.logic]
provider = "openai"
model = "gpt-4.1"
fallback_model = "claude-sonnet-4-5"
"#,
    );

    let err = ConfigLoader::load_from_file(&path).unwrap_err();
    assert!(err.to_string().contains("logic"));
    assert!(err.to_string().contains("fallback_model"));
}

#[tokio::test(start_paused = true)]
async fn test_configured_pipeline_runs_a_job() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_config(&temp_dir, "qforge.toml", GENERATORS_TOML);
    let config = ConfigLoader::load_from_file(&path).unwrap();

    let anthropic = ScriptedClient::healthy(ProviderId::Anthropic);
    let openai = ScriptedClient::healthy(ProviderId::OpenAI);
    let registry = ProviderRegistry::new()
        .with_client(anthropic.clone())
        .with_client(openai.clone());

    let router = Arc::new(SpecialistRouter::from_config(&config, Arc::new(registry)).unwrap());
    assert_eq!(router.retry_policy().max_attempts, 2);
    let coordinator = BatchGenerationCoordinator::from_config(&config, router).unwrap();

    // default_tier = fallback: math goes straight to anthropic, verbal to openai.
    let result = coordinator
        .run_job(GenerationJob::from_counts([("math", 2), ("verbal", 2)]))
        .await;

    assert_eq!(result.total_succeeded, 4);
    assert!(result.results["math"]
        .produced
        .iter()
        .all(|q| q.provider == ProviderId::Anthropic && q.model.as_str() == "claude-sonnet-4-5"));
    assert!(result.results["verbal"]
        .produced
        .iter()
        .all(|q| {
            q.provider == ProviderId::OpenAI && q.model == ProviderId::OpenAI.default_model()
        }));
    assert_eq!(anthropic.calls(), 2);
    assert_eq!(openai.calls(), 2);
}
