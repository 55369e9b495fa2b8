//! Configuration file sources, lowest precedence first.

pub mod global_file;
pub mod workspace_file;

/// Extensions tried when looking for a config file by base name.
pub(crate) const CONFIG_EXTENSIONS: [&str; 4] = ["toml", "yaml", "yml", "json"];

/// Whether `base` exists with any supported extension.
pub(crate) fn any_format_exists(base: &std::path::Path) -> bool {
    CONFIG_EXTENSIONS
        .iter()
        .any(|ext| base.with_extension(ext).exists())
}
