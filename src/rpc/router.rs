//! Method table - dispatches JSON-RPC requests to handlers keyed by
//! `(service, method)`.

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::frontend::context::panic_message;
use crate::frontend::{HandlerError, Protocol, RegistrationError, RequestContext};
use crate::observability::metrics;
use crate::rpc::error;
use crate::rpc::protocol::{RpcRequest, RpcResponse, JSONRPC_VERSION};

/// Type-erased RPC handler: `(context, params) -> result`.
pub type RpcHandler =
    Arc<dyn Fn(RequestContext, Value) -> BoxFuture<'static, Result<Value, HandlerError>> + Send + Sync>;

/// Wrap a typed async function as an [`RpcHandler`].
///
/// Params that do not deserialize into `P` fail with
/// [`HandlerError::InvalidRequest`] before the function runs.
pub fn handler_fn<P, R, F, Fut>(f: F) -> RpcHandler
where
    P: DeserializeOwned + 'static,
    R: Serialize + Send + 'static,
    F: Fn(RequestContext, P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, HandlerError>> + Send + 'static,
{
    Arc::new(move |ctx: RequestContext, params: Value| -> BoxFuture<'static, Result<Value, HandlerError>> {
        let call = serde_json::from_value::<P>(params).map(|params| f(ctx, params));
        Box::pin(async move {
            let result = call.map_err(|e| HandlerError::invalid(e.to_string()))?.await?;
            serde_json::to_value(result).map_err(|e| HandlerError::internal(e.to_string()))
        })
    })
}

/// Handler table of the structured-RPC front-end.
#[derive(Clone, Default)]
pub struct RpcRouter {
    handlers: HashMap<(String, String), RpcHandler>,
}

impl RpcRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler. Names must be non-empty and free of `/` and whitespace.
    pub fn insert(&mut self, service: &str, method: &str, handler: RpcHandler) -> Result<(), RegistrationError> {
        let route = format!("{}/{}", service, method);
        for part in [service, method] {
            if part.is_empty() {
                return Err(RegistrationError::InvalidRoute {
                    route,
                    reason: "service and method must not be empty",
                });
            }
            if part.contains('/') || part.chars().any(char::is_whitespace) {
                return Err(RegistrationError::InvalidRoute {
                    route,
                    reason: "service and method must not contain '/' or whitespace",
                });
            }
        }

        let key = (service.to_string(), method.to_string());
        if self.handlers.contains_key(&key) {
            return Err(RegistrationError::Duplicate {
                protocol: Protocol::Rpc,
                route,
            });
        }
        self.handlers.insert(key, handler);
        Ok(())
    }

    pub fn get(&self, service: &str, method: &str) -> Option<&RpcHandler> {
        self.handlers.get(&(service.to_string(), method.to_string()))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Registered routes as `service/method`, sorted.
    pub fn routes(&self) -> Vec<String> {
        let mut routes: Vec<String> = self
            .handlers
            .keys()
            .map(|(service, method)| format!("{}/{}", service, method))
            .collect();
        routes.sort();
        routes
    }

    /// Dispatch a request to its handler.
    ///
    /// Returns `None` for notifications (requests without an id). Unknown
    /// methods, bad params, handler errors and handler panics all become
    /// error responses.
    pub async fn dispatch(&self, request: RpcRequest, peer: Option<SocketAddr>) -> Option<RpcResponse> {
        let start = Instant::now();
        let notification = request.is_notification();
        let id = request.id.clone();

        if request.jsonrpc != JSONRPC_VERSION {
            let response = RpcResponse::error(
                id,
                error::INVALID_REQUEST,
                format!("Invalid request: unsupported jsonrpc version '{}'", request.jsonrpc),
            );
            return (!notification).then_some(response);
        }

        let handler = request
            .route()
            .and_then(|(service, method)| self.get(service, method))
            .cloned();
        let Some(handler) = handler else {
            tracing::debug!(method = %request.method, "Unknown RPC method");
            metrics::record_rpc_call(&request.method, "method_not_found", start);
            let response = RpcResponse::error(
                id,
                error::METHOD_NOT_FOUND,
                format!("Method not found: {}", request.method),
            );
            return (!notification).then_some(response);
        };

        let mut ctx = RequestContext::new(Protocol::Rpc, request.method.clone());
        if let Some(peer) = peer {
            ctx = ctx.with_peer(peer);
        }
        let request_id = ctx.request_id.clone();
        let params = request
            .params
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()));

        // Calling the handler inside the future puts its synchronous part
        // behind the same unwind boundary as the async part.
        let outcome = AssertUnwindSafe(async move { handler(ctx, params).await })
            .catch_unwind()
            .await;

        let response = match outcome {
            Ok(Ok(result)) => {
                metrics::record_rpc_call(&request.method, "ok", start);
                RpcResponse::success(id, result)
            }
            Ok(Err(err)) => {
                tracing::debug!(request_id = %request_id, method = %request.method, error = %err, "RPC handler returned an error");
                metrics::record_rpc_call(&request.method, err.kind(), start);
                RpcResponse::error(id, error::code_for(&err), err.to_string())
            }
            Err(payload) => {
                tracing::error!(
                    request_id = %request_id,
                    method = %request.method,
                    panic = %panic_message(payload.as_ref()),
                    "RPC handler panicked"
                );
                metrics::record_handler_panic(Protocol::Rpc);
                metrics::record_rpc_call(&request.method, "panic", start);
                RpcResponse::error(id, error::INTERNAL_ERROR, "Internal error: handler panicked")
            }
        };

        (!notification).then_some(response)
    }
}

impl std::fmt::Debug for RpcRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcRouter").field("routes", &self.routes()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::protocol::RpcId;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Echo {
        text: String,
    }

    fn router() -> RpcRouter {
        let mut router = RpcRouter::new();
        router
            .insert(
                "test",
                "Echo",
                handler_fn(|_ctx, params: Echo| async move { Ok::<_, HandlerError>(serde_json::json!({ "text": params.text })) }),
            )
            .unwrap();
        router
            .insert(
                "test",
                "Fail",
                handler_fn(|_ctx, _params: Value| async move {
                    Err::<Value, _>(HandlerError::NotFound("nothing here".into()))
                }),
            )
            .unwrap();
        router
            .insert(
                "test",
                "Panic",
                handler_fn(|_ctx, _params: Value| async move {
                    if true {
                        panic!("handler exploded");
                    }
                    Ok::<Value, HandlerError>(Value::Null)
                }),
            )
            .unwrap();
        router
    }

    fn request(method: &str, params: Option<Value>) -> RpcRequest {
        RpcRequest::new(RpcId::Num(1), method, params)
    }

    #[test]
    fn rejects_duplicates_and_bad_names() {
        let mut router = router();
        let dup = router.insert("test", "Echo", handler_fn(|_c, v: Value| async move { Ok::<_, HandlerError>(v) }));
        assert!(matches!(dup, Err(RegistrationError::Duplicate { .. })));

        let bad = router.insert("te st", "X", handler_fn(|_c, v: Value| async move { Ok::<_, HandlerError>(v) }));
        assert!(matches!(bad, Err(RegistrationError::InvalidRoute { .. })));

        let empty = router.insert("", "X", handler_fn(|_c, v: Value| async move { Ok::<_, HandlerError>(v) }));
        assert!(matches!(empty, Err(RegistrationError::InvalidRoute { .. })));

        assert_eq!(router.routes(), vec!["test/Echo", "test/Fail", "test/Panic"]);
    }

    #[tokio::test]
    async fn dispatches_typed_params() {
        let response = router()
            .dispatch(request("test/Echo", Some(serde_json::json!({"text": "hi"}))), None)
            .await
            .unwrap();
        assert_eq!(response.id, Some(RpcId::Num(1)));
        assert_eq!(response.result.unwrap()["text"], "hi");
    }

    #[tokio::test]
    async fn bad_params_are_invalid_params() {
        let response = router()
            .dispatch(request("test/Echo", Some(serde_json::json!({"wrong": 1}))), None)
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, error::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let router = router();
        for method in ["test/Nope", "nope/Echo", "Echo"] {
            let response = router.dispatch(request(method, None), None).await.unwrap();
            assert_eq!(response.error.unwrap().code, error::METHOD_NOT_FOUND, "{method}");
        }
    }

    #[tokio::test]
    async fn handler_error_maps_to_code() {
        let response = router().dispatch(request("test/Fail", None), None).await.unwrap();
        let err = response.error.unwrap();
        assert_eq!(err.code, error::NOT_FOUND);
        assert!(err.message.contains("nothing here"));
    }

    #[tokio::test]
    async fn panic_becomes_internal_error() {
        let router = router();
        let response = router.dispatch(request("test/Panic", None), None).await.unwrap();
        assert_eq!(response.error.unwrap().code, error::INTERNAL_ERROR);

        // The table is still usable afterwards.
        let response = router
            .dispatch(request("test/Echo", Some(serde_json::json!({"text": "again"}))), None)
            .await
            .unwrap();
        assert_eq!(response.result.unwrap()["text"], "again");
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let mut req = request("test/Echo", Some(serde_json::json!({"text": "quiet"})));
        req.id = None;
        assert!(router().dispatch(req, None).await.is_none());

        let mut req = request("test/Nope", None);
        req.id = None;
        assert!(router().dispatch(req, None).await.is_none());
    }

    #[tokio::test]
    async fn wrong_version_is_invalid_request() {
        let mut req = request("test/Echo", None);
        req.jsonrpc = "1.0".into();
        let response = router().dispatch(req, None).await.unwrap();
        assert_eq!(response.error.unwrap().code, error::INVALID_REQUEST);
    }
}
