//! `GET /healthz`.

use axum::Json;
use serde_json::json;

use crate::frontend::HandlerError;
use crate::handlers::timestamp_ms;
use crate::http::{handler_fn, HttpHandler};

pub fn healthz() -> HttpHandler {
    handler_fn(|_ctx, _req| async move {
        Ok::<_, HandlerError>(Json(json!({ "status": "ok", "timestamp_ms": timestamp_ms() })))
    })
}
