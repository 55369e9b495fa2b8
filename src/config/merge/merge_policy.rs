//! Merge rules: defaults, override order, conflict handling.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;
use config::Environment;

/// Prefix for environment overrides, e.g. `QFORGE__RETRY__MAX_ATTEMPTS=5`.
pub const ENV_PREFIX: &str = "QFORGE";

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("routing.default_tier", "primary")?
        .set_default("health.failure_threshold", 5)?
        .set_default("health.cooldown_secs", 60)?
        .set_default("retry.max_attempts", 3)?
        .set_default("batch.max_concurrency", 4)
}

/// Environment variables win over every file source.
pub fn environment_overrides() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
}
