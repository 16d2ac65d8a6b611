//! Protocol front-ends.
//!
//! # Data Flow
//! ```text
//! ListenerHandle
//!     → ProtocolFrontEnd::serve (accept loop, one task per connection)
//!     → protocol codec (rpc/ or http/)
//!     → handler table lookup
//!     → handler (panics caught here)
//! ```
//!
//! # States
//! ```text
//! Idle → Serving → Stopping → Stopped
//! Idle → Stopped            (stopped before serve was called)
//! ```
//!
//! # Design Decisions
//! - Handler tables are written before serve and frozen when it begins
//! - Stop is split in two: stop accepting now, force-close at the deadline
//! - An unknown route is a client error, never a serve error

pub mod context;
pub mod control;
pub mod serve_loop;

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::net::{ListenerError, ListenerHandle};

pub use context::{HandlerError, RequestContext};
pub use control::ServeControl;

/// Which protocol a front-end speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// JSON-RPC 2.0 over newline-delimited TCP.
    Rpc,
    /// HTTP/1.1.
    Http,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Rpc => "rpc",
            Protocol::Http => "http",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serving state of a single front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServingState {
    Idle,
    Serving,
    Stopping,
    Stopped,
}

/// Abnormal termination of a serve loop.
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("{0} front-end is already serving")]
    AlreadyServing(Protocol),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("invalid route table: {0}")]
    InvalidRoutes(String),

    #[error("serve loop panicked")]
    Panicked,
}

/// The deadline elapsed before in-flight work drained.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{protocol} front-end did not drain within {deadline:?}; remaining connections were closed")]
pub struct StopTimeout {
    pub protocol: Protocol,
    pub deadline: Duration,
}

/// Handler registration misuse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    #[error("cannot register {route}: {protocol} front-end already started serving")]
    AlreadyServing { protocol: Protocol, route: String },

    #[error("{route} is already registered on the {protocol} front-end")]
    Duplicate { protocol: Protocol, route: String },

    #[error("invalid route '{route}': {reason}")]
    InvalidRoute { route: String, reason: &'static str },
}

/// A protocol-specific server loop that the supervisor can start and stop.
#[async_trait]
pub trait ProtocolFrontEnd: Send + Sync + 'static {
    fn protocol(&self) -> Protocol;

    fn state(&self) -> ServingState;

    /// Accept and serve until stopped or until a fatal error.
    ///
    /// `shutdown` is the supervisor-wide token; cancelling it stops
    /// accepting just like [`graceful_stop`](Self::graceful_stop) does,
    /// but without a deadline.
    async fn serve(&self, listener: ListenerHandle, shutdown: CancellationToken) -> Result<(), ServeError>;

    /// Stop accepting now and wait up to `deadline` for in-flight work.
    ///
    /// A second call returns immediately.
    async fn graceful_stop(&self, deadline: Duration) -> Result<(), StopTimeout>;
}
