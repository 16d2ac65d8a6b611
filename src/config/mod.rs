//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! defaults
//!     → config file (TOML, optional)
//!     → SIDECAR_* environment overrides
//!     → validation.rs (semantic checks)
//!     → SidecarConfig (validated, immutable)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads and validates
//!     → update sent to the binary, which reports what needs a restart
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; listeners never rebind at runtime
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, load_with_env, ConfigError};
pub use schema::{LogFormat, LoggingConfig, MetricsConfig, PortConfig, ServerConfig, SidecarConfig};
