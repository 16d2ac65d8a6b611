//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! PortConfig
//!     → listener.rs (ListenerAllocator binds both ports up front)
//!     → ListenerHandle moved into one front-end
//!     → Listener (accept loop, connection limits)
//!     → connection.rs (lifecycle tracking)
//!     → Hand off to the RPC or HTTP layer
//! ```
//!
//! # Design Decisions
//! - Binding is synchronous and all-or-nothing
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection tracked for graceful shutdown

pub mod connection;
pub mod listener;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
pub use listener::{BindError, Listener, ListenerAllocator, ListenerError, ListenerHandle, ListenerPair};
