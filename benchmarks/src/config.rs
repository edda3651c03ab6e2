//! YAML configuration loading shared by the three binaries.
//!
//! Loads [`PipelineConfig`] from a YAML file on disk, falling back to
//! defaults when no file is specified. Every field is optional in the file.

use std::path::Path;
use tracing::info;
use tsadbench_core::PipelineConfig;

/// Environment variable naming a config file when `--config` is absent.
pub const CONFIG_ENV: &str = "TSADBENCH_CONFIG";

/// Load a [`PipelineConfig`] from a YAML file at `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read, the YAML is invalid, or the
/// resulting configuration fails validation.
pub fn load_config(path: &Path) -> anyhow::Result<PipelineConfig> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config file {}: {}", path.display(), e))?;
    let config: PipelineConfig = serde_yaml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("Failed to parse config YAML: {}", e))?;
    config.validate()?;
    Ok(config)
}

/// Load from `path` when given, otherwise use defaults.
///
/// The binaries fill `path` from `--config` or [`CONFIG_ENV`].
pub fn resolve_config(path: Option<&Path>) -> anyhow::Result<PipelineConfig> {
    match path {
        Some(path) => {
            info!(path = %path.display(), "Loading configuration from file");
            load_config(path)
        }
        None => {
            info!("No config file specified, using defaults");
            Ok(PipelineConfig::default())
        }
    }
}
