//! Workspace config file source: config/config.* and config/{env}.*

use super::any_format_exists;
use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::File;
use std::path::Path;

/// Add workspace config files to builder.
/// Precedence: config/config.* (base) then config/{QFORGE_ENV}.* (env-specific).
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
    workspace_root: &Path,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let config_dir = workspace_root.join("config");
    let env_name = std::env::var("QFORGE_ENV").unwrap_or_else(|_| "development".to_string());

    let mut builder = builder;

    let base_config = config_dir.join("config");
    if any_format_exists(&base_config) {
        builder = builder.add_source(File::from(base_config).required(false));
    }

    let env_config = config_dir.join(env_name);
    if any_format_exists(&env_config) {
        builder = builder.add_source(File::from(env_config).required(false));
    }

    Ok(builder)
}
