//! Serving state shared by a front-end's serve loop and its stop callers.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::frontend::{Protocol, RegistrationError, ServeError, ServingState, StopTimeout};

/// State machine plus the two stop signals of one front-end.
///
/// `stop` asks the accept loop to stop accepting and drain; `force`
/// aborts whatever is still running once the drain deadline elapsed.
#[derive(Debug)]
pub struct ServeControl {
    protocol: Protocol,
    state: Mutex<ServingState>,
    stop: CancellationToken,
    force: CancellationToken,
    stopped: watch::Sender<bool>,
}

impl ServeControl {
    pub fn new(protocol: Protocol) -> Self {
        let (stopped, _) = watch::channel(false);
        Self {
            protocol,
            state: Mutex::new(ServingState::Idle),
            stop: CancellationToken::new(),
            force: CancellationToken::new(),
            stopped,
        }
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn state(&self) -> ServingState {
        *self.lock()
    }

    // The guarded sections never panic, but a poisoned lock still holds a
    // valid state.
    fn lock(&self) -> MutexGuard<'_, ServingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` while the front-end is still `Idle`, holding the state lock
    /// so serving cannot begin halfway through a registration.
    pub fn while_idle<R>(&self, route: &str, f: impl FnOnce() -> R) -> Result<R, RegistrationError> {
        let state = self.lock();
        if *state != ServingState::Idle {
            return Err(RegistrationError::AlreadyServing {
                protocol: self.protocol,
                route: route.to_string(),
            });
        }
        Ok(f())
    }

    /// `Idle → Serving`, running `f` under the lock (used to freeze the
    /// handler table).
    ///
    /// Returns `Ok(None)` when the front-end was stopped before it ever
    /// served; the caller should return cleanly.
    pub fn begin_serving<R>(&self, f: impl FnOnce() -> R) -> Result<Option<R>, ServeError> {
        let mut state = self.lock();
        match *state {
            ServingState::Idle => {
                *state = ServingState::Serving;
                Ok(Some(f()))
            }
            ServingState::Stopped => Ok(None),
            ServingState::Serving | ServingState::Stopping => {
                Err(ServeError::AlreadyServing(self.protocol))
            }
        }
    }

    /// Cancelled when the front-end must stop accepting.
    pub fn stop_token(&self) -> &CancellationToken {
        &self.stop
    }

    /// Cancelled when remaining connections must be dropped.
    pub fn force_token(&self) -> &CancellationToken {
        &self.force
    }

    /// Called by the serve loop on its way out, whatever the reason.
    pub fn mark_stopped(&self) {
        *self.lock() = ServingState::Stopped;
        self.stopped.send_replace(true);
    }

    /// Stop accepting, wait up to `deadline` for the serve loop to drain,
    /// then force-close what is left.
    pub async fn graceful_stop(&self, deadline: Duration) -> Result<(), StopTimeout> {
        {
            let mut state = self.lock();
            match *state {
                ServingState::Idle => {
                    *state = ServingState::Stopped;
                    self.stop.cancel();
                    self.force.cancel();
                    self.stopped.send_replace(true);
                    tracing::debug!(protocol = %self.protocol, "Front-end stopped before serving");
                    return Ok(());
                }
                ServingState::Stopping | ServingState::Stopped => return Ok(()),
                ServingState::Serving => *state = ServingState::Stopping,
            }
        }

        tracing::info!(protocol = %self.protocol, deadline = ?deadline, "Front-end stopping");
        self.stop.cancel();

        let mut stopped = self.stopped.subscribe();
        let drained = tokio::time::timeout(deadline, stopped.wait_for(|done| *done))
            .await
            .is_ok();
        if drained {
            return Ok(());
        }

        tracing::warn!(
            protocol = %self.protocol,
            deadline = ?deadline,
            "Drain deadline elapsed, closing remaining connections"
        );
        self.force.cancel();
        let _ = stopped.wait_for(|done| *done).await;

        Err(StopTimeout {
            protocol: self.protocol,
            deadline,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn registration_only_while_idle() {
        let control = ServeControl::new(Protocol::Rpc);
        assert_eq!(control.while_idle("a/b", || 7).unwrap(), 7);

        control.begin_serving(|| ()).unwrap();
        let err = control.while_idle("a/b", || 7).unwrap_err();
        assert!(matches!(err, RegistrationError::AlreadyServing { protocol: Protocol::Rpc, .. }));
    }

    #[test]
    fn serving_twice_is_an_error() {
        let control = ServeControl::new(Protocol::Http);
        assert!(control.begin_serving(|| ()).unwrap().is_some());
        assert!(matches!(
            control.begin_serving(|| ()),
            Err(ServeError::AlreadyServing(Protocol::Http))
        ));
    }

    #[tokio::test]
    async fn stop_before_serve_skips_serving() {
        let control = ServeControl::new(Protocol::Rpc);
        control.graceful_stop(Duration::from_secs(1)).await.unwrap();
        assert_eq!(control.state(), ServingState::Stopped);
        assert!(control.stop_token().is_cancelled());
        assert!(control.begin_serving(|| ()).unwrap().is_none());
    }

    #[tokio::test]
    async fn graceful_stop_waits_for_loop_exit() {
        let control = Arc::new(ServeControl::new(Protocol::Rpc));
        control.begin_serving(|| ()).unwrap();

        let serve = {
            let control = control.clone();
            tokio::spawn(async move {
                control.stop_token().cancelled().await;
                tokio::time::sleep(Duration::from_millis(30)).await;
                control.mark_stopped();
            })
        };

        control.graceful_stop(Duration::from_secs(2)).await.unwrap();
        assert_eq!(control.state(), ServingState::Stopped);
        assert!(!control.force_token().is_cancelled());
        serve.await.unwrap();
    }

    #[tokio::test]
    async fn deadline_forces_close() {
        let control = Arc::new(ServeControl::new(Protocol::Http));
        control.begin_serving(|| ()).unwrap();

        let serve = {
            let control = control.clone();
            tokio::spawn(async move {
                control.force_token().cancelled().await;
                control.mark_stopped();
            })
        };

        let err = control.graceful_stop(Duration::from_millis(50)).await.unwrap_err();
        assert_eq!(err.protocol, Protocol::Http);
        assert_eq!(control.state(), ServingState::Stopped);
        serve.await.unwrap();
    }

    #[tokio::test]
    async fn second_stop_returns_immediately() {
        let control = Arc::new(ServeControl::new(Protocol::Rpc));
        control.begin_serving(|| ()).unwrap();

        let first = {
            let control = control.clone();
            tokio::spawn(async move { control.graceful_stop(Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(control.state(), ServingState::Stopping);

        tokio::time::timeout(Duration::from_millis(100), control.graceful_stop(Duration::from_secs(5)))
            .await
            .expect("second stop must not wait")
            .unwrap();

        control.mark_stopped();
        first.await.unwrap().unwrap();
    }
}
