//! Handler registration.
//!
//! A [`Registrar`] collects handlers for both protocols and attaches them
//! to the front-ends before the supervisor starts. Registration after
//! serving began fails with `RegistrationError::AlreadyServing`.

pub mod chat;
pub mod health;
pub mod helper;
pub mod voice;

use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::Method;

use crate::frontend::RegistrationError;
use crate::http::{HttpFrontEnd, HttpHandler};
use crate::lifecycle::SidecarServer;
use crate::rpc::{RpcFrontEnd, RpcHandler};

#[derive(Default)]
pub struct Registrar {
    rpc: Vec<(String, String, RpcHandler)>,
    http: Vec<(Method, String, HttpHandler)>,
}

impl Registrar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an RPC handler for `service/method`.
    pub fn rpc(mut self, service: &str, method: &str, handler: RpcHandler) -> Self {
        self.rpc.push((service.to_string(), method.to_string(), handler));
        self
    }

    /// Add an HTTP handler for `method path`.
    pub fn http(mut self, method: Method, path: &str, handler: HttpHandler) -> Self {
        self.http.push((method, path.to_string(), handler));
        self
    }

    /// Register everything with the given front-ends.
    ///
    /// Stops at the first rejected route; routes registered before it stay.
    pub fn attach_to(self, rpc: &RpcFrontEnd, http: &HttpFrontEnd) -> Result<(), RegistrationError> {
        let (rpc_count, http_count) = (self.rpc.len(), self.http.len());
        for (service, method, handler) in self.rpc {
            rpc.register(&service, &method, handler)?;
        }
        for (method, path, handler) in self.http {
            http.register(method, &path, handler)?;
        }
        tracing::info!(rpc_routes = rpc_count, http_routes = http_count, "Handlers registered");
        Ok(())
    }

    pub fn attach(self, server: &SidecarServer) -> Result<(), RegistrationError> {
        self.attach_to(server.rpc(), server.http())
    }
}

/// The built-in handlers every sidecar serves.
pub fn default_registrar() -> Registrar {
    Registrar::new()
        .rpc("helper", "Ping", helper::ping())
        .rpc("chat", "SendMessage", chat::send_message())
        .http(Method::GET, "/healthz", health::healthz())
        .http(Method::GET, "/voice/ping", voice::ping())
}

/// Milliseconds since the Unix epoch.
pub fn timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
