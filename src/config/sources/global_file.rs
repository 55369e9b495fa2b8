//! Global config file source: $XDG_CONFIG_HOME/qforge/config.* or ~/.config/qforge/config.*

use super::any_format_exists;
use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::File;
use std::path::PathBuf;
use tracing::debug;

/// Base path (without extension) of the global config file.
pub fn global_config_base() -> Option<PathBuf> {
    let config_home = std::env::var("XDG_CONFIG_HOME")
        .ok()
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var("HOME")
                .ok()
                .map(|home| PathBuf::from(home).join(".config"))
        })?;
    Some(config_home.join("qforge").join("config"))
}

/// Add global config file source to builder if it exists.
pub fn add_to_builder(
    mut builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    if let Some(base) = global_config_base() {
        if any_format_exists(&base) {
            builder = builder.add_source(File::from(base).required(false));
        } else {
            debug!(
                config_path = %base.display(),
                "No global configuration file found"
            );
        }
    }
    Ok(builder)
}
