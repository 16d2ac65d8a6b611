//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (ports non-zero and distinct, limits > 0)
//! - Check that enumerated strings (log level, metrics address) are usable
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: SidecarConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::{IpAddr, SocketAddr};

use crate::config::schema::SidecarConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid {name} port: 0 (must be between 1-65535)")]
    ZeroPort { name: &'static str },

    #[error("rpc and http ports cannot be the same: {0}")]
    SamePort(u16),

    #[error("invalid bind host '{0}'")]
    BindHost(String),

    #[error("{field} must be greater than zero")]
    NonPositive { field: &'static str },

    #[error("unknown log level '{0}'")]
    LogLevel(String),

    #[error("invalid metrics address '{0}'")]
    MetricsAddress(String),
}

/// Validate a parsed configuration, collecting every error.
pub fn validate_config(config: &SidecarConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.port.rpc == 0 {
        errors.push(ValidationError::ZeroPort { name: "rpc" });
    }
    if config.port.http == 0 {
        errors.push(ValidationError::ZeroPort { name: "http" });
    }
    if config.port.rpc != 0 && config.port.rpc == config.port.http {
        errors.push(ValidationError::SamePort(config.port.rpc));
    }

    if config.server.bind_host.parse::<IpAddr>().is_err() && config.server.bind_host != "localhost" {
        errors.push(ValidationError::BindHost(config.server.bind_host.clone()));
    }

    let limits = [
        ("server.max_connections", config.server.max_connections as u64),
        ("server.shutdown_timeout_secs", config.server.shutdown_timeout_secs),
        ("server.max_frame_bytes", config.server.max_frame_bytes as u64),
        ("server.max_body_bytes", config.server.max_body_bytes as u64),
    ];
    for (field, value) in limits {
        if value == 0 {
            errors.push(ValidationError::NonPositive { field });
        }
    }

    let level = config.logging.level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::LogLevel(config.logging.level.clone()));
    }

    if config.metrics.enabled && config.metrics.address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::MetricsAddress(config.metrics.address.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
