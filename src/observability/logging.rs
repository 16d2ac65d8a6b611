//! Structured logging.
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for log shippers, text format for humans
//! - `RUST_LOG` wins over the configured level when set

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("invalid log filter '{filter}': {source}")]
    Filter {
        filter: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },

    #[error("a global subscriber is already installed: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Filter directive for a bare level such as `debug`.
///
/// Our own crate logs at the given level; HTTP plumbing stays at `warn`
/// unless the level is `trace`.
pub fn default_directive(level: &str) -> String {
    let level = level.to_ascii_lowercase();
    if level == "trace" {
        level
    } else {
        format!("sidecar_helper={level},tower_http={level},hyper=warn,{level}")
    }
}

/// Install the global subscriber.
///
/// `level_override` comes from the command line and replaces the configured
/// level.
pub fn init_logging(config: &LoggingConfig, level_override: Option<&str>) -> Result<(), LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let directive = default_directive(level_override.unwrap_or(&config.level));
            EnvFilter::try_new(&directive).map_err(|source| LoggingError::Filter {
                filter: directive,
                source,
            })?
        }
    };

    let registry = tracing_subscriber::registry().with(filter);
    match config.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .try_init()?,
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).try_init()?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_keeps_hyper_quiet() {
        assert_eq!(
            default_directive("DEBUG"),
            "sidecar_helper=debug,tower_http=debug,hyper=warn,debug"
        );
        assert_eq!(default_directive("trace"), "trace");
        assert!(EnvFilter::try_new(default_directive("info")).is_ok());
    }
}
