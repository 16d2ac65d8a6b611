//! Supervisor: runs every mounted front-end and stops them together.
//!
//! # States
//! ```text
//! Idle → Serving → Stopping → Stopped
//! ```
//! `Stopped` is terminal. Serving again needs a new Supervisor.
//!
//! # Failure Handling
//! When one front-end's serve loop fails (or panics) the Supervisor cancels
//! the shared token and stops the others with
//! [`DEFAULT_FAILURE_STOP_TIMEOUT`](super::shutdown::DEFAULT_FAILURE_STOP_TIMEOUT)
//! unless configured otherwise. `start` reports the first failure.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::join_all;
use futures_util::FutureExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::frontend::context::panic_message;
use crate::frontend::{Protocol, ProtocolFrontEnd, ServeError, StopTimeout};
use crate::lifecycle::shutdown::DEFAULT_FAILURE_STOP_TIMEOUT;
use crate::net::ListenerHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Serving,
    Stopping,
    Stopped,
}

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("supervisor was already started")]
    AlreadyStarted,

    #[error("supervisor is not running")]
    NotRunning,

    #[error("{protocol} front-end failed: {source}")]
    Serve {
        protocol: Protocol,
        #[source]
        source: ServeError,
    },

    #[error("shutdown deadline of {deadline:?} elapsed; connections were force-closed on {protocols:?}")]
    ShutdownTimeout {
        protocols: Vec<Protocol>,
        deadline: Duration,
    },
}

struct Mount {
    front_end: Arc<dyn ProtocolFrontEnd>,
    listener: Mutex<Option<ListenerHandle>>,
}

impl Mount {
    fn take_listener(&self) -> Option<ListenerHandle> {
        self.listener.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

#[derive(Default)]
pub struct SupervisorBuilder {
    mounts: Vec<Mount>,
    failure_stop_timeout: Option<Duration>,
}

impl SupervisorBuilder {
    /// Mount a front-end together with the listener it will serve on.
    pub fn mount(mut self, front_end: Arc<dyn ProtocolFrontEnd>, listener: ListenerHandle) -> Self {
        self.mounts.push(Mount {
            front_end,
            listener: Mutex::new(Some(listener)),
        });
        self
    }

    /// Deadline for stopping the survivors after one front-end failed.
    pub fn failure_stop_timeout(mut self, timeout: Duration) -> Self {
        self.failure_stop_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Supervisor {
        Supervisor {
            mounts: self.mounts,
            state: Mutex::new(SupervisorState::Idle),
            shutdown: CancellationToken::new(),
            failure_stop_timeout: self.failure_stop_timeout.unwrap_or(DEFAULT_FAILURE_STOP_TIMEOUT),
        }
    }
}

pub struct Supervisor {
    mounts: Vec<Mount>,
    state: Mutex<SupervisorState>,
    shutdown: CancellationToken,
    failure_stop_timeout: Duration,
}

impl Supervisor {
    pub fn builder() -> SupervisorBuilder {
        SupervisorBuilder::default()
    }

    pub fn state(&self) -> SupervisorState {
        *self.lock_state()
    }

    /// Protocols of the mounted front-ends, in mount order.
    pub fn protocols(&self) -> Vec<Protocol> {
        self.mounts.iter().map(|m| m.front_end.protocol()).collect()
    }

    fn lock_state(&self) -> MutexGuard<'_, SupervisorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Serve every mounted front-end until all of them have exited.
    ///
    /// Returns the first front-end failure, or `Ok(())` after a clean stop.
    pub async fn start(&self) -> Result<(), SupervisorError> {
        {
            let mut state = self.lock_state();
            if *state != SupervisorState::Idle {
                return Err(SupervisorError::AlreadyStarted);
            }
            *state = SupervisorState::Serving;
        }
        tracing::info!(front_ends = ?self.protocols(), "Supervisor starting");

        let mut serving = JoinSet::new();
        for mount in &self.mounts {
            let front_end = mount.front_end.clone();
            let protocol = front_end.protocol();
            let Some(listener) = mount.take_listener() else {
                tracing::warn!(protocol = %protocol, "No listener left for front-end, skipping");
                continue;
            };
            let token = self.shutdown.clone();
            serving.spawn(async move {
                let result = AssertUnwindSafe(front_end.serve(listener, token))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|payload| {
                        tracing::error!(
                            protocol = %protocol,
                            panic = %panic_message(payload.as_ref()),
                            "Front-end serve loop panicked"
                        );
                        Err(ServeError::Panicked)
                    });
                (protocol, result)
            });
        }

        let mut first_error = None;
        let mut stops = JoinSet::new();
        while let Some(joined) = serving.join_next().await {
            let (protocol, result) = match joined {
                Ok(exit) => exit,
                Err(e) => {
                    tracing::error!(error = %e, "Front-end task failed");
                    continue;
                }
            };

            match result {
                Ok(()) => tracing::info!(protocol = %protocol, "Front-end exited"),
                Err(source) => {
                    tracing::error!(protocol = %protocol, error = %source, "Front-end failed");
                    if first_error.is_none() {
                        self.stop_after_failure(&mut stops);
                        first_error = Some(SupervisorError::Serve { protocol, source });
                    }
                }
            }
        }

        while let Some(joined) = stops.join_next().await {
            if let Ok(Err(timeout)) = joined {
                tracing::warn!(error = %timeout, "Front-end force-closed after sibling failure");
            }
        }

        *self.lock_state() = SupervisorState::Stopped;
        match first_error {
            Some(err) => Err(err),
            None => {
                tracing::info!("Supervisor stopped");
                Ok(())
            }
        }
    }

    /// Begin stopping every front-end because one of them failed.
    ///
    /// Does nothing if a shutdown is already under way.
    fn stop_after_failure(&self, stops: &mut JoinSet<Result<(), StopTimeout>>) {
        {
            let mut state = self.lock_state();
            if *state != SupervisorState::Serving {
                return;
            }
            *state = SupervisorState::Stopping;
        }

        tracing::warn!(deadline = ?self.failure_stop_timeout, "Stopping remaining front-ends");
        self.shutdown.cancel();
        for mount in &self.mounts {
            let front_end = mount.front_end.clone();
            let deadline = self.failure_stop_timeout;
            stops.spawn(async move { front_end.graceful_stop(deadline).await });
        }
    }

    /// Stop accepting on every front-end and wait up to `deadline` for
    /// in-flight work.
    ///
    /// Calling it while already stopping or stopped returns `Ok(())`
    /// immediately. If any front-end had to be force-closed the result is
    /// [`SupervisorError::ShutdownTimeout`], but the Supervisor still ends
    /// up `Stopped`.
    pub async fn shutdown(&self, deadline: Duration) -> Result<(), SupervisorError> {
        {
            let mut state = self.lock_state();
            match *state {
                SupervisorState::Idle => return Err(SupervisorError::NotRunning),
                SupervisorState::Stopping | SupervisorState::Stopped => return Ok(()),
                SupervisorState::Serving => *state = SupervisorState::Stopping,
            }
        }

        tracing::info!(deadline = ?deadline, "Supervisor shutting down");
        self.shutdown.cancel();

        let results = join_all(self.mounts.iter().map(|m| m.front_end.graceful_stop(deadline))).await;
        let protocols: Vec<Protocol> = results
            .into_iter()
            .filter_map(|result| result.err().map(|timeout| timeout.protocol))
            .collect();

        *self.lock_state() = SupervisorState::Stopped;

        if protocols.is_empty() {
            tracing::info!("Shutdown complete");
            Ok(())
        } else {
            tracing::warn!(protocols = ?protocols, deadline = ?deadline, "Shutdown deadline elapsed");
            Err(SupervisorError::ShutdownTimeout { protocols, deadline })
        }
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("front_ends", &self.protocols())
            .field("state", &self.state())
            .finish()
    }
}
