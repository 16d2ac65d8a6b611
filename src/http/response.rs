//! Error responses.
//!
//! Every error the HTTP front-end produces itself has the same JSON shape:
//!
//! ```text
//! { "error": { "code": "not_found", "message": "no route for GET /x" } }
//! ```

use std::any::Any;

use axum::body::Body;
use axum::http::{header, Method, Response, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::frontend::context::panic_message;
use crate::frontend::{HandlerError, Protocol};
use crate::observability::metrics;

pub fn status_for(err: &HandlerError) -> StatusCode {
    match err {
        HandlerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        HandlerError::NotFound(_) => StatusCode::NOT_FOUND,
        HandlerError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        HandlerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn error_response(status: StatusCode, code: &str, message: impl Into<String>) -> axum::response::Response {
    let body = json!({ "error": { "code": code, "message": message.into() } });
    (status, Json(body)).into_response()
}

pub fn handler_error_response(err: &HandlerError) -> axum::response::Response {
    error_response(status_for(err), err.kind(), err.to_string())
}

/// Fallback for paths no handler was registered for.
pub async fn not_found(method: Method, uri: Uri) -> axum::response::Response {
    error_response(
        StatusCode::NOT_FOUND,
        "not_found",
        format!("no route for {} {}", method, uri.path()),
    )
}

/// Response used by the catch-panic layer.
pub fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response<Body> {
    tracing::error!(panic = %panic_message(payload.as_ref()), "HTTP handler panicked");
    metrics::record_handler_panic(Protocol::Http);

    let body = json!({ "error": { "code": "internal", "message": "internal error: handler panicked" } });
    let mut response = Response::new(Body::from(body.to_string()));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, header::HeaderValue::from_static("application/json"));
    response
}
