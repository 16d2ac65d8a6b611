//! Accept loop shared by both front-ends.
//!
//! # Responsibilities
//! - Accept until the front-end or the supervisor asks to stop
//! - Spawn one task per connection and keep them in a JoinSet
//! - Close the listener only after the stop signal was observed
//! - Drain connections, or abort them once the force signal fires

use std::future::Future;
use std::net::SocketAddr;

use tokio::net::TcpStream;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::frontend::{ServeControl, ServeError};
use crate::net::listener::is_connection_error;
use crate::net::{ConnectionTracker, Listener, ListenerError};

/// Run the accept loop until stopped, then drain.
///
/// `handle` receives each accepted stream together with a drain token that
/// is cancelled when the front-end stops accepting; connection handlers use
/// it to finish in-flight work and close.
pub async fn run<H, Fut>(
    listener: Listener,
    control: &ServeControl,
    tracker: &ConnectionTracker,
    shutdown: &CancellationToken,
    handle: H,
) -> Result<(), ServeError>
where
    H: Fn(TcpStream, SocketAddr, CancellationToken) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let protocol = control.protocol();
    let drain = CancellationToken::new();
    let mut connections = JoinSet::new();

    tracing::info!(protocol = %protocol, address = %listener.local_addr(), "Front-end serving");

    let result = loop {
        tokio::select! {
            biased;

            _ = control.stop_token().cancelled() => break Ok(()),
            _ = shutdown.cancelled() => break Ok(()),

            Some(joined) = connections.join_next(), if !connections.is_empty() => {
                log_connection_exit(protocol.as_str(), joined);
            }

            accepted = listener.accept() => match accepted {
                Ok((stream, peer, permit)) => {
                    let guard = tracker.track();
                    tracing::debug!(protocol = %protocol, connection_id = %guard.id(), peer_addr = %peer, "Connection opened");
                    let connection = handle(stream, peer, drain.clone());
                    connections.spawn(async move {
                        let _permit = permit;
                        let _guard = guard;
                        connection.await;
                    });
                }
                Err(ListenerError::Accept(e)) if is_connection_error(&e) => {
                    tracing::debug!(protocol = %protocol, error = %e, "Accept failed for one connection");
                }
                Err(e) => {
                    tracing::error!(protocol = %protocol, error = %e, "Accept loop failed");
                    break Err(ServeError::from(e));
                }
            },
        }
    };

    // No accept is in flight any more; closing the socket cannot race one.
    drop(listener);
    drain.cancel();

    if result.is_err() {
        connections.abort_all();
    }

    tracing::debug!(protocol = %protocol, connections = connections.len(), "Draining connections");

    let force = control.force_token();
    loop {
        tokio::select! {
            biased;

            _ = force.cancelled() => {
                tracing::warn!(protocol = %protocol, connections = connections.len(), "Aborting connections");
                connections.abort_all();
                while connections.join_next().await.is_some() {}
                break;
            }

            joined = connections.join_next() => match joined {
                Some(joined) => log_connection_exit(protocol.as_str(), joined),
                None => break,
            },
        }
    }

    control.mark_stopped();
    tracing::info!(protocol = %protocol, "Front-end stopped");
    result
}

fn log_connection_exit(protocol: &str, joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            tracing::error!(protocol, error = %e, "Connection task panicked");
        }
    }
}
