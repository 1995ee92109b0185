//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::KilnConfig;
use std::collections::HashSet;
use std::path::Path;

/// Name of the configuration file looked up in a project directory.
pub const CONFIG_FILE: &str = "kiln.toml";

/// Loads and validates `kiln.toml` from a project directory.
pub fn load_config(project_dir: &Path) -> Result<KilnConfig, ConfigError> {
    load_config_file(&project_dir.join(CONFIG_FILE))
}

/// Loads and validates a configuration file at an explicit path.
pub fn load_config_file(path: &Path) -> Result<KilnConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    load_config_from_str(&content)
}

/// Parses and validates a `kiln.toml` configuration from a string.
///
/// Useful for testing without filesystem dependencies.
pub fn load_config_from_str(content: &str) -> Result<KilnConfig, ConfigError> {
    let config: KilnConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Validates that required fields are present and inputs are consistent.
fn validate_config(config: &KilnConfig) -> Result<(), ConfigError> {
    if config.merge.name.is_empty() {
        return Err(ConfigError::MissingField("merge.name".to_string()));
    }
    if config.merge.output.is_empty() {
        return Err(ConfigError::MissingField("merge.output".to_string()));
    }
    if config.merge.cache_dir.is_empty() {
        return Err(ConfigError::ValidationError(
            "merge.cache_dir must not be empty".to_string(),
        ));
    }
    if config.inputs.is_empty() {
        return Err(ConfigError::ValidationError(
            "at least one [[inputs]] entry is required".to_string(),
        ));
    }

    let output = normalize(&config.merge.output);
    let mut seen = HashSet::new();
    for (i, input) in config.inputs.iter().enumerate() {
        if input.path.is_empty() {
            return Err(ConfigError::MissingField(format!("inputs[{i}].path")));
        }
        let path = normalize(&input.path);
        if path == output {
            return Err(ConfigError::ValidationError(format!(
                "input '{}' is also the merge output",
                input.path
            )));
        }
        if !seen.insert(path) {
            return Err(ConfigError::ValidationError(format!(
                "input '{}' is listed more than once",
                input.path
            )));
        }
    }
    Ok(())
}

/// Strips `./` prefixes and trailing separators so equivalent spellings compare equal.
fn normalize(path: &str) -> &str {
    let mut path = path.trim_end_matches(&['/', '\\'][..]);
    while let Some(rest) = path.strip_prefix("./") {
        path = rest;
    }
    path
}
