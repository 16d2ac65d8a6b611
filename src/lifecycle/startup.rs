//! Startup orchestration.
//!
//! # Responsibilities
//! - Bind both listeners up front (any bind failure is fatal)
//! - Build the RPC and HTTP front-ends from the server settings
//! - Mount both into one Supervisor
//! - Attach the built-in handlers
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Handlers are attached before `start`, the tables freeze when serving begins

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::SidecarConfig;
use crate::frontend::RegistrationError;
use crate::handlers::default_registrar;
use crate::http::{HttpFrontEnd, HttpSettings};
use crate::lifecycle::supervisor::{Supervisor, SupervisorError, SupervisorState};
use crate::net::{BindError, ListenerAllocator};
use crate::rpc::{RpcFrontEnd, RpcSettings};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Bind(#[from] BindError),

    #[error(transparent)]
    Registration(#[from] RegistrationError),
}

/// Both front-ends mounted into one Supervisor, listeners already bound.
pub struct SidecarServer {
    supervisor: Supervisor,
    rpc: Arc<RpcFrontEnd>,
    http: Arc<HttpFrontEnd>,
    rpc_addr: SocketAddr,
    http_addr: SocketAddr,
}

impl SidecarServer {
    /// Bind both ports and build the front-ends. No handlers are attached.
    pub fn bind(config: &SidecarConfig) -> Result<Self, BindError> {
        let listeners = ListenerAllocator::new(config.server.bind_host.clone()).bind_pair(&config.port)?;
        let rpc_addr = listeners.rpc.local_addr();
        let http_addr = listeners.http.local_addr();

        let rpc = Arc::new(RpcFrontEnd::new(RpcSettings::from(&config.server)));
        let http = Arc::new(HttpFrontEnd::new(HttpSettings::from(&config.server)));

        let supervisor = Supervisor::builder()
            .mount(rpc.clone(), listeners.rpc)
            .mount(http.clone(), listeners.http)
            .failure_stop_timeout(config.server.shutdown_timeout())
            .build();

        tracing::info!(rpc_address = %rpc_addr, http_address = %http_addr, "Listeners bound");

        Ok(Self {
            supervisor,
            rpc,
            http,
            rpc_addr,
            http_addr,
        })
    }

    pub fn rpc(&self) -> &RpcFrontEnd {
        &self.rpc
    }

    pub fn http(&self) -> &HttpFrontEnd {
        &self.http
    }

    pub fn rpc_addr(&self) -> SocketAddr {
        self.rpc_addr
    }

    pub fn http_addr(&self) -> SocketAddr {
        self.http_addr
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    pub fn state(&self) -> SupervisorState {
        self.supervisor.state()
    }

    pub async fn start(&self) -> Result<(), SupervisorError> {
        self.supervisor.start().await
    }

    pub async fn shutdown(&self, deadline: Duration) -> Result<(), SupervisorError> {
        self.supervisor.shutdown(deadline).await
    }
}

impl std::fmt::Debug for SidecarServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SidecarServer")
            .field("rpc_addr", &self.rpc_addr)
            .field("http_addr", &self.http_addr)
            .field("state", &self.state())
            .finish()
    }
}

/// Bind the listeners and attach the built-in handlers.
pub fn bootstrap(config: &SidecarConfig) -> Result<SidecarServer, StartupError> {
    let server = SidecarServer::bind(config)?;
    default_registrar().attach(&server)?;
    Ok(server)
}
