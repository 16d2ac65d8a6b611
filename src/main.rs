//! Sidecar helper
//!
//! Serves a JSON-RPC front-end and an HTTP front-end from one process and
//! stops both together on SIGINT/SIGTERM.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────┐
//!                 │                  SIDECAR                     │
//!                 │                                              │
//!   JSON-RPC ─────┼─▶ net listener ─▶ rpc front-end ─▶ handlers  │
//!   (TCP, JSONL)  │        (rpc port)                            │
//!                 │                                              │
//!   HTTP/1.1 ─────┼─▶ net listener ─▶ http front-end ─▶ handlers │
//!                 │        (http port)                           │
//!                 │                                              │
//!                 │  ┌────────────────────────────────────────┐  │
//!                 │  │ lifecycle: supervisor, signals, drain  │  │
//!                 │  │ config · observability                 │  │
//!                 │  └────────────────────────────────────────┘  │
//!                 └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use sidecar_helper::config::watcher::{assess_reload, ConfigWatcher, ReloadOutcome};
use sidecar_helper::config::{load_with_env, SidecarConfig};
use sidecar_helper::lifecycle::{bootstrap, run_until_shutdown, shutdown_signal};
use sidecar_helper::observability::{logging, metrics};

#[derive(Parser, Debug)]
#[command(name = "sidecar-helper", version, about = "Dual-protocol sidecar (JSON-RPC + HTTP)")]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(short, long)]
    level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = load_with_env(args.config.as_deref())?;
    logging::init_logging(&config.logging, args.level.as_deref())?;

    tracing::info!("sidecar-helper v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        rpc_port = config.port.rpc,
        http_port = config.port.http,
        bind_host = %config.server.bind_host,
        max_connections = config.server.max_connections,
        "Configuration loaded"
    );

    if config.metrics.enabled {
        match config.metrics.address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.metrics.address,
                "Failed to parse metrics address"
            ),
        }
    }

    let server = bootstrap(&config)?;

    // Kept alive for the lifetime of the process.
    let _watcher = match &args.config {
        Some(path) => Some(spawn_config_watcher(path.clone(), config.clone())?),
        None => None,
    };

    if let Err(e) = run_until_shutdown(server.supervisor(), shutdown_signal()).await {
        tracing::error!(error = %e, "Sidecar stopped with an error");
        return Err(e.into());
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Watch the config file and report changes that need a restart.
fn spawn_config_watcher(
    path: PathBuf,
    current: SidecarConfig,
) -> Result<notify::RecommendedWatcher, notify::Error> {
    let (watcher, mut updates) = ConfigWatcher::new(&path);
    let handle = watcher.run()?;

    tokio::spawn(async move {
        while let Some(reloaded) = updates.recv().await {
            match assess_reload(&current, &reloaded) {
                ReloadOutcome::Unchanged => tracing::debug!("Config reloaded, nothing changed"),
                ReloadOutcome::RestartRequired(fields) => tracing::warn!(
                    changed = ?fields,
                    "Config changed on disk; restart the sidecar to apply"
                ),
            }
        }
    });

    Ok(handle)
}
