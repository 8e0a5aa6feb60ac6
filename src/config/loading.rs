//! Reading the optional TOML configuration file.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use super::Config;
use super::validation::validate_config;

/// Load and validate the configuration file at `path`.
///
/// Unlike the defaults layer, an explicitly named file must exist.
pub fn load_from_path(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;

    let config = parse(&content)
        .with_context(|| format!("Failed to parse config from {}", path.display()))?;

    validate_config(&config)
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;

    Ok(config)
}

/// Parse TOML text; unknown keys are rejected.
pub fn parse(content: &str) -> Result<Config> {
    Ok(toml::from_str(content)?)
}
