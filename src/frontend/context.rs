//! Per-request context and handler errors.

use std::net::SocketAddr;
use std::time::Instant;

use uuid::Uuid;

use crate::frontend::Protocol;

/// What a handler knows about the request it is serving.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub protocol: Protocol,
    /// `service/method` for RPC, `METHOD /path` for HTTP.
    pub route: String,
    pub peer_addr: Option<SocketAddr>,
    pub received_at: Instant,
}

impl RequestContext {
    pub fn new(protocol: Protocol, route: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            protocol,
            route: route.into(),
            peer_addr: None,
            received_at: Instant::now(),
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn with_peer(mut self, peer_addr: SocketAddr) -> Self {
        self.peer_addr = Some(peer_addr);
        self
    }
}

/// Error returned by a handler. Confined to its own request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandlerError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl HandlerError {
    pub fn invalid(message: impl Into<String>) -> Self {
        HandlerError::InvalidRequest(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        HandlerError::Internal(message.into())
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            HandlerError::InvalidRequest(_) => "invalid_request",
            HandlerError::NotFound(_) => "not_found",
            HandlerError::Unavailable(_) => "unavailable",
            HandlerError::Internal(_) => "internal",
        }
    }
}

/// Best-effort text of a caught panic payload.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_gets_fresh_request_ids() {
        let a = RequestContext::new(Protocol::Rpc, "helper/Ping");
        let b = RequestContext::new(Protocol::Rpc, "helper/Ping");
        assert_ne!(a.request_id, b.request_id);
        assert_eq!(a.route, "helper/Ping");

        let c = a.with_request_id("fixed");
        assert_eq!(c.request_id, "fixed");
    }

    #[test]
    fn panic_payloads_are_readable() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");

        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("kaboom"));
        assert_eq!(panic_message(boxed.as_ref()), "kaboom");

        let boxed: Box<dyn std::any::Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }
}
