//! Sidecar helper library
//!
//! One process, two protocol front-ends (JSON-RPC over TCP and HTTP/1.1),
//! one supervised lifecycle.

pub mod config;
pub mod frontend;
pub mod handlers;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod rpc;

pub use config::SidecarConfig;
pub use frontend::{HandlerError, Protocol, ProtocolFrontEnd, RegistrationError, RequestContext, ServeError};
pub use handlers::{default_registrar, Registrar};
pub use http::HttpFrontEnd;
pub use lifecycle::{bootstrap, SidecarServer, Supervisor, SupervisorError, SupervisorState};
pub use net::{BindError, ListenerAllocator};
pub use rpc::RpcFrontEnd;
