//! Configuration file watcher for hot reload.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_with_env;
use crate::config::schema::SidecarConfig;

/// A watcher that monitors the configuration file for changes.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<SidecarConfig>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// Returns the watcher and a receiver for configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<SidecarConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching the file in a background thread.
    ///
    /// Only configurations that parse and validate are forwarded; the
    /// returned watcher must be kept alive for events to flow.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx.clone();
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        tracing::info!(path = ?path, "Config file change detected, reloading");
                        match load_with_env(Some(&path)) {
                            Ok(new_config) => {
                                let _ = tx.send(new_config);
                            }
                            Err(e) => {
                                tracing::error!(error = %e, "Failed to reload config, keeping current configuration");
                            }
                        }
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

/// What a reloaded configuration means for a running sidecar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// Nothing that matters at runtime changed.
    Unchanged,
    /// Listener settings changed; they only apply after a restart.
    RestartRequired(Vec<&'static str>),
}

/// Compare a reloaded configuration against the one the server was bound with.
pub fn assess_reload(current: &SidecarConfig, reloaded: &SidecarConfig) -> ReloadOutcome {
    let mut changed = Vec::new();
    if current.port.rpc != reloaded.port.rpc {
        changed.push("port.rpc");
    }
    if current.port.http != reloaded.port.http {
        changed.push("port.http");
    }
    if current.server != reloaded.server {
        changed.push("server");
    }
    if current.logging != reloaded.logging {
        changed.push("logging");
    }
    if current.metrics != reloaded.metrics {
        changed.push("metrics");
    }

    if changed.is_empty() {
        ReloadOutcome::Unchanged
    } else {
        ReloadOutcome::RestartRequired(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::PortConfig;

    /// Receive reloads until one has the wanted ports, returning everything seen.
    async fn wait_for_ports(
        updates: &mut mpsc::UnboundedReceiver<SidecarConfig>,
        wanted: PortConfig,
    ) -> Vec<SidecarConfig> {
        let mut seen = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(config) = updates.recv().await {
                let done = config.port == wanted;
                seen.push(config);
                if done {
                    return;
                }
            }
            panic!("watcher channel closed");
        })
        .await
        .expect("reloaded config not delivered");
        seen
    }

    #[tokio::test]
    async fn rewrites_are_reloaded_and_invalid_ones_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sidecar.toml");
        std::fs::write(&path, "[port]\nrpc = 9600\nhttp = 9601\n").unwrap();

        let (watcher, mut updates) = ConfigWatcher::new(&path);
        let _handle = watcher.run().unwrap();

        std::fs::write(&path, "[port]\nrpc = 9700\nhttp = 9701\n").unwrap();
        let seen = wait_for_ports(&mut updates, PortConfig::new(9700, 9701)).await;
        assert_eq!(seen.last().unwrap().port, PortConfig::new(9700, 9701));

        // Same port twice fails validation and must never reach the channel.
        std::fs::write(&path, "[port]\nrpc = 9800\nhttp = 9800\n").unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        std::fs::write(&path, "[port]\nrpc = 9900\nhttp = 9901\n").unwrap();

        let seen = wait_for_ports(&mut updates, PortConfig::new(9900, 9901)).await;
        assert!(seen.iter().all(|config| config.port.rpc != config.port.http));
    }

    #[test]
    fn identical_config_is_unchanged() {
        let config = SidecarConfig::default();
        assert_eq!(assess_reload(&config, &config.clone()), ReloadOutcome::Unchanged);
    }

    #[test]
    fn port_change_requires_restart() {
        let current = SidecarConfig::default();
        let mut reloaded = current.clone();
        reloaded.port = PortConfig::new(current.port.rpc, 9999);
        reloaded.logging.level = "debug".into();

        assert_eq!(
            assess_reload(&current, &reloaded),
            ReloadOutcome::RestartRequired(vec!["port.http", "logging"])
        );
    }
}
