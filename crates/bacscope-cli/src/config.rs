use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bacscope_core::AnalysisConfig;

/// Looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "bacscope.yaml";

/// Load the analysis configuration.
///
/// An explicit path must exist and parse. Without one, `bacscope.yaml` in
/// the working directory is used when present, else the defaults.
pub fn load_config(path: Option<&Path>) -> Result<AnalysisConfig> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let p = PathBuf::from(DEFAULT_CONFIG_FILE);
            if p.exists() {
                p
            } else {
                return Ok(AnalysisConfig::default());
            }
        }
    };
    let text = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    if text.trim().is_empty() {
        return Ok(AnalysisConfig::default());
    }
    let config: AnalysisConfig = serde_yaml::from_str(&text)
        .with_context(|| format!("Invalid config file: {}", path.display()))?;
    tracing::debug!(path = %path.display(), "configuration loaded");
    Ok(config)
}
