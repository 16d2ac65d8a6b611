//! Configuration loading from disk and environment.
//!
//! Precedence, highest first: environment variables, config file, defaults.

use std::fs;
use std::path::Path;

use crate::config::schema::SidecarConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Prefix shared by every environment override.
pub const ENV_PREFIX: &str = "SIDECAR";

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value '{value}' for {key}")]
    Env { key: String, value: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<SidecarConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: SidecarConfig = toml::from_str(&content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Build the effective configuration: defaults, then the optional file,
/// then `SIDECAR_*` environment overrides, then validation.
pub fn load_with_env(path: Option<&Path>) -> Result<SidecarConfig, ConfigError> {
    load_with(path, |key| std::env::var(key).ok())
}

/// Same as [`load_with_env`] with an injectable environment lookup.
pub fn load_with<F>(path: Option<&Path>, env: F) -> Result<SidecarConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => SidecarConfig::default(),
    };

    apply_env_overrides(&mut config, env)?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply `SIDECAR_*` overrides on top of an already parsed config.
///
/// The ports also answer to their older names, `SIDECAR_PORT_HELPER` and
/// `SIDECAR_PORT_VOICE`; the current name wins when both are set.
pub fn apply_env_overrides<F>(config: &mut SidecarConfig, env: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let lookup = |suffix: &str| {
        let key = format!("{}_{}", ENV_PREFIX, suffix);
        env(&key).map(|value| (key, value))
    };

    if let Some((key, value)) = lookup("PORT_RPC").or_else(|| lookup("PORT_HELPER")) {
        config.port.rpc = parse_env(key, value)?;
    }
    if let Some((key, value)) = lookup("PORT_HTTP").or_else(|| lookup("PORT_VOICE")) {
        config.port.http = parse_env(key, value)?;
    }
    if let Some((_, value)) = lookup("SERVER_BIND_HOST") {
        config.server.bind_host = value;
    }
    if let Some((_, value)) = lookup("LOG_LEVEL") {
        config.logging.level = value;
    }
    if let Some((key, value)) = lookup("LOG_FORMAT") {
        config.logging.format = value
            .parse()
            .map_err(|_| ConfigError::Env { key, value })?;
    }

    Ok(())
}

fn parse_env<T: std::str::FromStr>(key: String, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Env { key, value })
}
