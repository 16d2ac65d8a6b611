//! TCP listener allocation and accept with backpressure.
//!
//! # Responsibilities
//! - Bind both front-end ports up front, synchronously
//! - Close the first socket if the second bind fails
//! - Accept incoming TCP connections
//! - Enforce max_connections limit via semaphore

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

use crate::config::PortConfig;

/// Error type for binding listeners.
#[derive(Debug, thiserror::Error)]
pub enum BindError {
    /// Port outside 1-65535.
    #[error("invalid {name} port: {port} (must be between 1-65535)")]
    InvalidPort { name: &'static str, port: u16 },

    /// Both front-ends were given the same port.
    #[error("rpc and http ports cannot be the same: {0}")]
    SamePort(u16),

    /// The bind host is not an IP address.
    #[error("invalid bind host '{0}'")]
    InvalidAddress(String),

    /// The operating system refused the bind.
    #[error("failed to bind {addr}: {source}")]
    Io {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Error type for accept-side operations.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// Failed to hand the socket to the runtime.
    #[error("Failed to register listener: {0}")]
    Register(std::io::Error),

    /// Failed to accept connection.
    #[error("Failed to accept: {0}")]
    Accept(std::io::Error),

    /// The connection limit semaphore was closed.
    #[error("Connection limit closed")]
    Closed,
}

/// An open, bound socket that has not started accepting yet.
///
/// Owned by exactly one front-end after handoff and closed when dropped.
#[derive(Debug)]
pub struct ListenerHandle {
    inner: std::net::TcpListener,
    local_addr: SocketAddr,
}

impl ListenerHandle {
    /// Bind a single address.
    pub fn bind(addr: SocketAddr) -> Result<Self, BindError> {
        let inner =
            std::net::TcpListener::bind(addr).map_err(|source| BindError::Io { addr, source })?;
        let local_addr = inner
            .local_addr()
            .map_err(|source| BindError::Io { addr, source })?;

        tracing::info!(address = %local_addr, "Listener bound");

        Ok(Self { inner, local_addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Convert into a runtime listener. Must be called inside a Tokio runtime.
    pub fn into_listener(self, max_connections: usize) -> Result<Listener, ListenerError> {
        self.inner
            .set_nonblocking(true)
            .map_err(ListenerError::Register)?;
        let inner = TcpListener::from_std(self.inner).map_err(ListenerError::Register)?;

        Ok(Listener {
            inner,
            local_addr: self.local_addr,
            connection_limit: Arc::new(Semaphore::new(max_connections)),
            max_connections,
        })
    }
}

/// The pair of sockets handed to the two front-ends.
#[derive(Debug)]
pub struct ListenerPair {
    pub rpc: ListenerHandle,
    pub http: ListenerHandle,
}

/// Binds the two front-end ports.
#[derive(Debug, Clone)]
pub struct ListenerAllocator {
    host: String,
}

impl ListenerAllocator {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }

    /// Open both listen sockets, or none.
    ///
    /// No retry: callers that want to wait for a busy port must loop.
    pub fn bind_pair(&self, ports: &PortConfig) -> Result<ListenerPair, BindError> {
        if ports.rpc == 0 {
            return Err(BindError::InvalidPort { name: "rpc", port: ports.rpc });
        }
        if ports.http == 0 {
            return Err(BindError::InvalidPort { name: "http", port: ports.http });
        }
        if ports.rpc == ports.http {
            return Err(BindError::SamePort(ports.rpc));
        }

        let ip = self.ip()?;
        let rpc = ListenerHandle::bind(SocketAddr::new(ip, ports.rpc))?;
        // On failure `rpc` is dropped here, closing the first socket.
        let http = ListenerHandle::bind(SocketAddr::new(ip, ports.http))?;

        Ok(ListenerPair { rpc, http })
    }

    fn ip(&self) -> Result<IpAddr, BindError> {
        if self.host == "localhost" {
            return Ok(IpAddr::V4(Ipv4Addr::LOCALHOST));
        }
        self.host
            .parse()
            .map_err(|_| BindError::InvalidAddress(self.host.clone()))
    }
}

impl Default for ListenerAllocator {
    fn default() -> Self {
        Self::new("127.0.0.1")
    }
}

/// A bounded TCP listener that limits concurrent connections.
///
/// Uses a semaphore to enforce `max_connections`. When the limit is reached,
/// new connections will wait until a slot becomes available.
pub struct Listener {
    inner: TcpListener,
    local_addr: SocketAddr,
    connection_limit: Arc<Semaphore>,
    max_connections: usize,
}

impl Listener {
    /// Accept a new connection, respecting the connection limit.
    ///
    /// Returns the stream and a permit that must be held for the connection's lifetime.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, ConnectionPermit), ListenerError> {
        // Acquire permit first (backpressure)
        let permit = self
            .connection_limit
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ListenerError::Closed)?;

        let (stream, addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;

        tracing::debug!(
            peer_addr = %addr,
            available_permits = self.connection_limit.available_permits(),
            "Connection accepted"
        );

        Ok((stream, addr, ConnectionPermit { _permit: permit }))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Get current available connection slots.
    pub fn available_permits(&self) -> usize {
        self.connection_limit.available_permits()
    }

    /// Get configured maximum connections.
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}

/// A permit representing a connection slot.
///
/// When dropped, the connection slot is released back to the pool,
/// even if the connection task was aborted.
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: tokio::sync::OwnedSemaphorePermit,
}

/// Accept errors that only concern the connection being accepted.
pub fn is_connection_error(err: &std::io::Error) -> bool {
    use std::io::ErrorKind;
    matches!(
        err.kind(),
        ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionReset
            | ErrorKind::Interrupted
            | ErrorKind::WouldBlock
            | ErrorKind::TimedOut
    )
}
