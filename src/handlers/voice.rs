//! `voice` HTTP service.

use axum::Json;
use serde::{Deserialize, Serialize};

use crate::frontend::HandlerError;
use crate::handlers::timestamp_ms;
use crate::http::{handler_fn, HttpHandler};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoicePing {
    pub service: String,
    pub timestamp_ms: u64,
}

/// `GET /voice/ping`
pub fn ping() -> HttpHandler {
    handler_fn(|_ctx, _req| async move {
        Ok::<_, HandlerError>(Json(VoicePing {
            service: "voice".to_string(),
            timestamp_ms: timestamp_ms(),
        }))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::{Protocol, RequestContext};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};

    #[tokio::test]
    async fn answers_with_service_name() {
        let ctx = RequestContext::new(Protocol::Http, "GET /voice/ping");
        let request = Request::builder().uri("/voice/ping").body(Body::empty()).unwrap();
        let response = ping()(ctx, request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let body: VoicePing = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.service, "voice");
    }
}
