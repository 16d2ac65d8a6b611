//! HTTP front-end.
//!
//! # Responsibilities
//! - Freeze the route table into an axum Router when serving begins
//! - Wire up middleware (request ID, tracing, metrics, panic recovery, body limit)
//! - Serve each accepted connection with hyper's HTTP/1.1 server
//! - On drain, let in-flight requests finish and close idle keep-alives

use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::extract::{ConnectInfo, Request};
use axum::http::Method;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::Router;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::service::TowerToHyperService;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tower::{ServiceBuilder, ServiceExt};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::frontend::{
    serve_loop, Protocol, ProtocolFrontEnd, RegistrationError, ServeControl, ServeError, ServingState, StopTimeout,
};
use crate::http::response::panic_response;
use crate::http::router::{HttpHandler, HttpRouteTable};
use crate::net::{ConnectionTracker, ListenerHandle};
use crate::observability::metrics;

/// Limits applied to the HTTP front-end.
#[derive(Debug, Clone, Copy)]
pub struct HttpSettings {
    pub max_connections: usize,
    pub max_body_bytes: usize,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            max_connections: 1024,
            max_body_bytes: 1024 * 1024,
        }
    }
}

impl From<&ServerConfig> for HttpSettings {
    fn from(config: &ServerConfig) -> Self {
        Self {
            max_connections: config.max_connections,
            max_body_bytes: config.max_body_bytes,
        }
    }
}

pub struct HttpFrontEnd {
    control: ServeControl,
    tracker: ConnectionTracker,
    routes: Mutex<HttpRouteTable>,
    settings: HttpSettings,
}

impl HttpFrontEnd {
    pub fn new(settings: HttpSettings) -> Self {
        Self {
            control: ServeControl::new(Protocol::Http),
            tracker: ConnectionTracker::new(Protocol::Http),
            routes: Mutex::new(HttpRouteTable::new()),
            settings,
        }
    }

    /// Register a handler for `method path`.
    ///
    /// Fails once the front-end has started serving.
    pub fn register(&self, method: Method, path: &str, handler: HttpHandler) -> Result<(), RegistrationError> {
        let route = format!("{} {}", method, path);
        self.control
            .while_idle(&route, || self.lock_routes().insert(method, path, handler))??;
        tracing::debug!(route = %route, "Registered HTTP handler");
        Ok(())
    }

    /// Registered routes as `METHOD /path`, sorted.
    pub fn routes(&self) -> Vec<String> {
        self.lock_routes().routes()
    }

    pub fn active_connections(&self) -> u64 {
        self.tracker.active_count()
    }

    fn lock_routes(&self) -> MutexGuard<'_, HttpRouteTable> {
        self.routes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wrap the routed handlers in the middleware stack.
    ///
    /// Outermost first: request ID, tracing, ID propagation, metrics,
    /// panic recovery, body limit.
    fn build_app(&self, router: Router) -> Router {
        router.layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(middleware::from_fn(record_metrics))
                .layer(CatchPanicLayer::custom(panic_response))
                .layer(RequestBodyLimitLayer::new(self.settings.max_body_bytes)),
        )
    }
}

impl Default for HttpFrontEnd {
    fn default() -> Self {
        Self::new(HttpSettings::default())
    }
}

impl std::fmt::Debug for HttpFrontEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpFrontEnd")
            .field("state", &self.control.state())
            .field("settings", &self.settings)
            .finish()
    }
}

#[async_trait]
impl ProtocolFrontEnd for HttpFrontEnd {
    fn protocol(&self) -> Protocol {
        Protocol::Http
    }

    fn state(&self) -> ServingState {
        self.control.state()
    }

    async fn serve(&self, listener: ListenerHandle, shutdown: CancellationToken) -> Result<(), ServeError> {
        let frozen = self
            .control
            .begin_serving(|| std::mem::take(&mut *self.lock_routes()))?;
        let Some(table) = frozen else {
            tracing::debug!("HTTP front-end stopped before serving");
            return Ok(());
        };
        tracing::debug!(routes = ?table.routes(), "HTTP route table frozen");

        let router = match table.into_router() {
            Ok(router) => router,
            Err(e) => {
                tracing::error!(error = %e, "HTTP route table rejected");
                self.control.mark_stopped();
                return Err(e);
            }
        };
        let listener = match listener.into_listener(self.settings.max_connections) {
            Ok(listener) => listener,
            Err(e) => {
                self.control.mark_stopped();
                return Err(e.into());
            }
        };
        let app = self.build_app(router);

        serve_loop::run(listener, &self.control, &self.tracker, &shutdown, |stream, peer, drain| {
            serve_connection(stream, peer, app.clone(), drain)
        })
        .await
    }

    async fn graceful_stop(&self, deadline: Duration) -> Result<(), StopTimeout> {
        self.control.graceful_stop(deadline).await
    }
}

async fn record_metrics(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let response = next.run(request).await;
    metrics::record_http_request(&method, response.status().as_u16(), start);
    response
}

/// Serve one HTTP/1.1 connection.
///
/// When `drain` fires, hyper finishes the request in flight (if any) and
/// closes the connection instead of waiting for the next one.
async fn serve_connection(stream: TcpStream, peer: SocketAddr, app: Router, drain: CancellationToken) {
    let service = app.map_request(move |mut request: hyper::Request<Incoming>| {
        request.extensions_mut().insert(ConnectInfo(peer));
        request
    });

    let conn = http1::Builder::new()
        .timer(TokioTimer::new())
        .serve_connection(TokioIo::new(stream), TowerToHyperService::new(service));
    let mut conn = std::pin::pin!(conn);
    let mut draining = false;

    loop {
        tokio::select! {
            result = conn.as_mut() => {
                if let Err(e) = result {
                    tracing::debug!(peer_addr = %peer, error = %e, "HTTP connection ended with error");
                }
                break;
            }
            _ = drain.cancelled(), if !draining => {
                tracing::debug!(peer_addr = %peer, "Draining HTTP connection");
                draining = true;
                conn.as_mut().graceful_shutdown();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::HandlerError;
    use crate::http::router::handler_fn;
    use axum::Json;
    use std::sync::Arc;

    fn hello() -> HttpHandler {
        handler_fn(|ctx, _req| async move {
            Ok::<_, HandlerError>(Json(serde_json::json!({ "hello": "world", "request_id": ctx.request_id })))
        })
    }

    async fn start(front: Arc<HttpFrontEnd>) -> (SocketAddr, tokio::task::JoinHandle<Result<(), ServeError>>) {
        let handle = ListenerHandle::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = handle.local_addr();
        let task = tokio::spawn(async move { front.serve(handle, CancellationToken::new()).await });
        (addr, task)
    }

    #[tokio::test]
    async fn serves_routes_with_request_ids() {
        let front = Arc::new(HttpFrontEnd::default());
        front.register(Method::GET, "/hello", hello()).unwrap();
        let (addr, task) = start(front.clone()).await;

        let response = reqwest::get(format!("http://{}/hello", addr)).await.unwrap();
        assert_eq!(response.status(), 200);
        let header_id = response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap();
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["hello"], "world");
        assert_eq!(body["request_id"], header_id);

        let response = reqwest::get(format!("http://{}/missing", addr)).await.unwrap();
        assert_eq!(response.status(), 404);
        assert!(response.headers().contains_key("x-request-id"));

        front.graceful_stop(Duration::from_secs(2)).await.unwrap();
        task.await.unwrap().unwrap();
        assert_eq!(front.state(), ServingState::Stopped);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let front = Arc::new(HttpFrontEnd::new(HttpSettings {
            max_connections: 16,
            max_body_bytes: 16,
        }));
        front
            .register(
                Method::POST,
                "/upload",
                handler_fn(|_ctx, req: Request| async move {
                    axum::body::to_bytes(req.into_body(), usize::MAX)
                        .await
                        .map(|bytes| bytes.len().to_string())
                        .map_err(|e| HandlerError::invalid(e.to_string()))
                }),
            )
            .unwrap();
        let (addr, task) = start(front.clone()).await;

        let response = reqwest::Client::new()
            .post(format!("http://{}/upload", addr))
            .body("x".repeat(64))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 413);

        front.graceful_stop(Duration::from_secs(2)).await.unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn invalid_route_table_fails_serve() {
        let front = HttpFrontEnd::default();
        front.register(Method::GET, "/users/{id}", hello()).unwrap();
        front.register(Method::GET, "/users/{name}", hello()).unwrap();
        let handle = ListenerHandle::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = handle.local_addr();

        let err = front.serve(handle, CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ServeError::InvalidRoutes(_)));
        assert_eq!(front.state(), ServingState::Stopped);
        // The listener was released.
        assert!(std::net::TcpListener::bind(addr).is_ok());
    }
}
