//! Request-side helpers.
//!
//! # Design Decisions
//! - Request ID added by the outermost layer, before tracing and handlers
//! - A client-supplied `x-request-id` is kept as-is
//! - Peer address is attached per connection as `ConnectInfo`

use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::{HeaderName, Request};

use crate::frontend::{Protocol, RequestContext};

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// The request's `x-request-id`, if present and valid UTF-8.
pub fn request_id<B>(request: &Request<B>) -> Option<String> {
    request
        .headers()
        .get(&X_REQUEST_ID)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Build the handler context for a routed request.
pub fn context_for<B>(request: &Request<B>, route: impl Into<String>) -> RequestContext {
    let mut ctx = RequestContext::new(Protocol::Http, route);
    if let Some(id) = request_id(request) {
        ctx = ctx.with_request_id(id);
    }
    if let Some(ConnectInfo(peer)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        ctx = ctx.with_peer(*peer);
    }
    ctx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_picks_up_id_and_peer() {
        let peer: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        let mut request = Request::builder()
            .uri("/healthz")
            .header("x-request-id", "abc-123")
            .body(())
            .unwrap();
        request.extensions_mut().insert(ConnectInfo(peer));

        let ctx = context_for(&request, "GET /healthz");
        assert_eq!(ctx.request_id, "abc-123");
        assert_eq!(ctx.peer_addr, Some(peer));
        assert_eq!(ctx.protocol, Protocol::Http);
    }

    #[test]
    fn context_without_header_gets_fresh_id() {
        let request = Request::builder().uri("/").body(()).unwrap();
        let ctx = context_for(&request, "GET /");
        assert!(!ctx.request_id.is_empty());
        assert!(ctx.peer_addr.is_none());
    }
}
