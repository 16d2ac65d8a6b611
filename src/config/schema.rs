//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the sidecar.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the sidecar.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct SidecarConfig {
    /// Ports of the two front-ends.
    pub port: PortConfig,

    /// Listener and drain settings shared by both front-ends.
    pub server: ServerConfig,

    /// Log level and format.
    pub logging: LoggingConfig,

    /// Prometheus exporter settings.
    pub metrics: MetricsConfig,
}

/// The two listen ports.
///
/// Ports are `u16`, so anything above 65535 is rejected while parsing;
/// port 0 is rejected by validation and again by the listener allocator.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct PortConfig {
    /// Structured-RPC front-end.
    #[serde(alias = "helper")]
    pub rpc: u16,

    /// HTTP front-end.
    #[serde(alias = "voice")]
    pub http: u16,
}

impl PortConfig {
    pub fn new(rpc: u16, http: u16) -> Self {
        Self { rpc, http }
    }
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            rpc: 8767,
            http: 8768,
        }
    }
}

/// Listener and lifecycle settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Host both listeners bind to (e.g., "127.0.0.1").
    pub bind_host: String,

    /// Maximum concurrent connections per front-end (backpressure).
    pub max_connections: usize,

    /// Deadline used when one front-end fails and the other is stopped.
    pub shutdown_timeout_secs: u64,

    /// Maximum size of a single RPC frame (one JSON line).
    pub max_frame_bytes: usize,

    /// Maximum HTTP request body size.
    pub max_body_bytes: usize,
}

impl ServerConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: "127.0.0.1".to_string(),
            max_connections: 1024,
            shutdown_timeout_secs: 5,
            max_frame_bytes: 1024 * 1024,
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// One of trace, debug, info, warn, error.
    pub level: String,

    /// Text for humans, JSON for log shippers.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Metrics exporter configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Install the Prometheus exporter.
    pub enabled: bool,

    /// Address the exporter listens on.
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "127.0.0.1:9769".to_string(),
        }
    }
}
