//! Configuration loader: assembles sources per the merge policy and validates the result.

use super::merge::merge_policy;
use super::sources::{global_file, workspace_file};
use super::QforgeConfig;
use crate::error::ConfigurationError;
use config::File;
use std::path::{Path, PathBuf};
use tracing::info;

/// Entry point for loading `QforgeConfig`.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a workspace.
    ///
    /// Priority order (highest to lowest):
    /// 1. `QFORGE__*` environment variables
    /// 2. `config/{QFORGE_ENV}.*` in the workspace
    /// 3. `config/config.*` in the workspace
    /// 4. Global config file
    /// 5. Defaults
    pub fn load(workspace_root: &Path) -> Result<QforgeConfig, ConfigurationError> {
        let mut builder = merge_policy::builder_with_defaults()?;
        builder = global_file::add_to_builder(builder)?;
        builder = workspace_file::add_to_builder(builder, workspace_root)?;
        builder = builder.add_source(merge_policy::environment_overrides());

        let config: QforgeConfig = builder.build()?.try_deserialize()?;
        config.ensure_valid()?;
        info!(
            workspace = %workspace_root.display(),
            generators = config.generators.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Load configuration from a single file (TOML, YAML or JSON by extension).
    pub fn load_from_file(path: &Path) -> Result<QforgeConfig, ConfigurationError> {
        let config: QforgeConfig = merge_policy::builder_with_defaults()?
            .add_source(File::from(path).required(true))
            .build()?
            .try_deserialize()?;
        config.ensure_valid()?;
        Ok(config)
    }

    /// Base path of the global config file, if HOME or XDG_CONFIG_HOME is set.
    pub fn global_config_path() -> Option<PathBuf> {
        global_file::global_config_base()
    }
}
