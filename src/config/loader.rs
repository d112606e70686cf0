//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::StreamProxyConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid {name}: {value:?}")]
    Env { name: &'static str, value: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<StreamProxyConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: StreamProxyConfig = toml::from_str(&content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Split a comma-separated host list: trimmed, lowercased, empties dropped.
pub fn parse_host_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|h| h.trim().to_lowercase())
        .filter(|h| !h.is_empty())
        .collect()
}

/// Overlay `STREAM_HOSTS`, `PORT` and `BASE_PATH` onto `config`.
///
/// `lookup` is the environment accessor, `std::env::var(..).ok()` in production.
pub fn apply_env<F>(config: &mut StreamProxyConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup("STREAM_HOSTS") {
        let hosts = parse_host_list(&raw);
        if !hosts.is_empty() {
            config.stream.allowed_hosts = hosts;
        }
    }

    if let Some(raw) = lookup("PORT") {
        config.listener.port = raw.trim().parse().map_err(|_| ConfigError::Env {
            name: "PORT",
            value: raw.clone(),
        })?;
    }

    if let Some(raw) = lookup("BASE_PATH") {
        config.stream.base_path = raw.trim().trim_end_matches('/').to_string();
    }

    Ok(())
}
