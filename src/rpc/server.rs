//! Structured-RPC front-end: JSON-RPC 2.0 over newline-delimited TCP.
//!
//! Each connection reads frames in a loop and dispatches every call on its
//! own task, so a slow handler does not hold up the calls behind it.
//! Responses are written in completion order; clients match them by id.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::frontend::{
    serve_loop, Protocol, ProtocolFrontEnd, RegistrationError, ServeControl, ServeError, ServingState, StopTimeout,
};
use crate::net::{ConnectionTracker, ListenerHandle};
use crate::rpc::protocol::RpcResponse;
use crate::rpc::router::{RpcHandler, RpcRouter};
use crate::rpc::transport::{Frame, FrameReader, FrameWriter};

/// Limits applied to every RPC connection.
#[derive(Debug, Clone, Copy)]
pub struct RpcSettings {
    pub max_connections: usize,
    pub max_frame_bytes: usize,
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            max_connections: 1024,
            max_frame_bytes: 1024 * 1024,
        }
    }
}

impl From<&ServerConfig> for RpcSettings {
    fn from(config: &ServerConfig) -> Self {
        Self {
            max_connections: config.max_connections,
            max_frame_bytes: config.max_frame_bytes,
        }
    }
}

pub struct RpcFrontEnd {
    control: ServeControl,
    tracker: ConnectionTracker,
    routes: Mutex<RpcRouter>,
    settings: RpcSettings,
}

impl RpcFrontEnd {
    pub fn new(settings: RpcSettings) -> Self {
        Self {
            control: ServeControl::new(Protocol::Rpc),
            tracker: ConnectionTracker::new(Protocol::Rpc),
            routes: Mutex::new(RpcRouter::new()),
            settings,
        }
    }

    /// Register a handler for `service/method`.
    ///
    /// Fails once the front-end has started serving.
    pub fn register(&self, service: &str, method: &str, handler: RpcHandler) -> Result<(), RegistrationError> {
        let route = format!("{}/{}", service, method);
        self.control
            .while_idle(&route, || self.lock_routes().insert(service, method, handler))??;
        tracing::debug!(route = %route, "Registered RPC handler");
        Ok(())
    }

    /// Registered routes as `service/method`, sorted.
    pub fn routes(&self) -> Vec<String> {
        self.lock_routes().routes()
    }

    pub fn active_connections(&self) -> u64 {
        self.tracker.active_count()
    }

    fn lock_routes(&self) -> MutexGuard<'_, RpcRouter> {
        self.routes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for RpcFrontEnd {
    fn default() -> Self {
        Self::new(RpcSettings::default())
    }
}

impl std::fmt::Debug for RpcFrontEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcFrontEnd")
            .field("state", &self.control.state())
            .field("settings", &self.settings)
            .finish()
    }
}

#[async_trait]
impl ProtocolFrontEnd for RpcFrontEnd {
    fn protocol(&self) -> Protocol {
        Protocol::Rpc
    }

    fn state(&self) -> ServingState {
        self.control.state()
    }

    async fn serve(&self, listener: ListenerHandle, shutdown: CancellationToken) -> Result<(), ServeError> {
        let frozen = self
            .control
            .begin_serving(|| std::mem::take(&mut *self.lock_routes()))?;
        let Some(router) = frozen else {
            tracing::debug!("RPC front-end stopped before serving");
            return Ok(());
        };
        let router = Arc::new(router);
        tracing::debug!(routes = ?router.routes(), "RPC handler table frozen");

        let listener = match listener.into_listener(self.settings.max_connections) {
            Ok(listener) => listener,
            Err(e) => {
                self.control.mark_stopped();
                return Err(e.into());
            }
        };

        let max_frame_bytes = self.settings.max_frame_bytes;
        serve_loop::run(listener, &self.control, &self.tracker, &shutdown, |stream, peer, drain| {
            serve_connection(stream, peer, router.clone(), drain, max_frame_bytes)
        })
        .await
    }

    async fn graceful_stop(&self, deadline: Duration) -> Result<(), StopTimeout> {
        self.control.graceful_stop(deadline).await
    }
}

/// Serve one connection until EOF, an I/O error, or drain.
///
/// On drain the connection stops reading, lets in-flight calls finish,
/// writes their responses and closes.
async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    router: Arc<RpcRouter>,
    drain: CancellationToken,
    max_frame_bytes: usize,
) {
    let _ = stream.set_nodelay(true);
    let (read_half, write_half) = stream.into_split();
    let mut reader = FrameReader::new(read_half, max_frame_bytes);
    let mut writer = FrameWriter::new(write_half);
    let mut calls: JoinSet<Option<RpcResponse>> = JoinSet::new();
    let mut reading = true;

    loop {
        if !reading && calls.is_empty() {
            break;
        }

        tokio::select! {
            biased;

            _ = drain.cancelled(), if reading => {
                tracing::debug!(peer_addr = %peer, in_flight = calls.len(), "Draining RPC connection");
                reading = false;
            }

            Some(joined) = calls.join_next(), if !calls.is_empty() => {
                let response = match joined {
                    Ok(response) => response,
                    Err(e) => {
                        // dispatch catches handler panics; this is a bug in the call task itself
                        tracing::error!(peer_addr = %peer, error = %e, "RPC call task failed");
                        None
                    }
                };
                if let Some(response) = response {
                    if let Err(e) = writer.write_response(&response).await {
                        tracing::debug!(peer_addr = %peer, error = %e, "RPC write failed, dropping connection");
                        return;
                    }
                }
            }

            frame = reader.next_frame(), if reading => match frame {
                Ok(Some(Frame::Request(request))) => {
                    let router = router.clone();
                    calls.spawn(async move { router.dispatch(request, Some(peer)).await });
                }
                Ok(Some(Frame::Rejected(response))) => {
                    if let Err(e) = writer.write_response(&response).await {
                        tracing::debug!(peer_addr = %peer, error = %e, "RPC write failed, dropping connection");
                        return;
                    }
                }
                Ok(None) => {
                    tracing::debug!(peer_addr = %peer, "RPC client closed the connection");
                    reading = false;
                }
                Err(e) => {
                    tracing::debug!(peer_addr = %peer, error = %e, "RPC read failed, dropping connection");
                    return;
                }
            },
        }
    }

    if let Err(e) = writer.close().await {
        tracing::debug!(peer_addr = %peer, error = %e, "RPC connection close failed");
    }
    tracing::debug!(peer_addr = %peer, "RPC connection closed");
}
