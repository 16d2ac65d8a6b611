//! Route table of the HTTP front-end, keyed by `(method, path)`.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodFilter, MethodRouter};
use axum::Router;
use futures_util::future::BoxFuture;

use crate::frontend::context::panic_message;
use crate::frontend::{HandlerError, Protocol, RegistrationError, RequestContext, ServeError};
use crate::http::request::context_for;
use crate::http::response;

/// Type-erased HTTP handler: `(context, request) -> response`.
pub type HttpHandler =
    Arc<dyn Fn(RequestContext, Request<Body>) -> BoxFuture<'static, Result<Response, HandlerError>> + Send + Sync>;

/// Wrap an async function as an [`HttpHandler`].
pub fn handler_fn<R, F, Fut>(f: F) -> HttpHandler
where
    R: IntoResponse + 'static,
    F: Fn(RequestContext, Request<Body>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, HandlerError>> + Send + 'static,
{
    Arc::new(move |ctx: RequestContext, request: Request<Body>| -> BoxFuture<'static, Result<Response, HandlerError>> {
        let fut = f(ctx, request);
        Box::pin(async move { fut.await.map(IntoResponse::into_response) })
    })
}

struct Entry {
    filter: MethodFilter,
    handler: HttpHandler,
}

#[derive(Default)]
pub struct HttpRouteTable {
    routes: HashMap<(Method, String), Entry>,
}

impl HttpRouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler. Paths must start with `/`, contain no whitespace and
    /// write captures as `{name}` or `{*name}`.
    pub fn insert(&mut self, method: Method, path: &str, handler: HttpHandler) -> Result<(), RegistrationError> {
        let route = format!("{} {}", method, path);
        if !path.starts_with('/') {
            return Err(RegistrationError::InvalidRoute {
                route,
                reason: "path must start with '/'",
            });
        }
        if path.chars().any(char::is_whitespace) {
            return Err(RegistrationError::InvalidRoute {
                route,
                reason: "path must not contain whitespace",
            });
        }
        if path.split('/').any(|segment| segment.starts_with(':') || segment.starts_with('*')) {
            return Err(RegistrationError::InvalidRoute {
                route,
                reason: "path parameters are written {name}, not :name or *name",
            });
        }
        if !router_accepts(path) {
            return Err(RegistrationError::InvalidRoute {
                route,
                reason: "path rejected by the router",
            });
        }
        let Ok(filter) = MethodFilter::try_from(method.clone()) else {
            return Err(RegistrationError::InvalidRoute {
                route,
                reason: "unsupported HTTP method",
            });
        };

        let key = (method, path.to_string());
        if self.routes.contains_key(&key) {
            return Err(RegistrationError::Duplicate {
                protocol: Protocol::Http,
                route,
            });
        }
        self.routes.insert(key, Entry { filter, handler });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Registered routes as `METHOD /path`, sorted.
    pub fn routes(&self) -> Vec<String> {
        let mut routes: Vec<String> = self
            .routes
            .keys()
            .map(|(method, path)| format!("{} {}", method, path))
            .collect();
        routes.sort();
        routes
    }

    /// Build the axum router. Unknown paths fall through to a JSON 404.
    ///
    /// axum rejects malformed or conflicting paths by panicking; that
    /// surfaces here as [`ServeError::InvalidRoutes`].
    pub fn into_router(self) -> Result<Router, ServeError> {
        let mut by_path: BTreeMap<String, Vec<(Method, Entry)>> = BTreeMap::new();
        for ((method, path), entry) in self.routes {
            by_path.entry(path).or_default().push((method, entry));
        }

        let build = AssertUnwindSafe(move || {
            let mut router = Router::new();
            for (path, entries) in by_path {
                let mut method_router = MethodRouter::new();
                for (method, entry) in entries {
                    let route = format!("{} {}", method, path);
                    method_router = method_router.on(entry.filter, endpoint(entry.handler, route));
                }
                router = router.route(&path, method_router);
            }
            router.fallback(response::not_found)
        });

        std::panic::catch_unwind(build).map_err(|payload| ServeError::InvalidRoutes(panic_message(payload.as_ref())))
    }
}

/// Whether axum accepts `path` on its own. Conflicts between routes are
/// only known once the whole table is built in [`HttpRouteTable::into_router`].
fn router_accepts(path: &str) -> bool {
    std::panic::catch_unwind(AssertUnwindSafe(|| {
        let _ = Router::<()>::new().route(path, axum::routing::get(|| async {}));
    }))
    .is_ok()
}

/// Adapt a table entry to an axum handler.
fn endpoint(
    handler: HttpHandler,
    route: String,
) -> impl Fn(Request<Body>) -> BoxFuture<'static, Response> + Clone + Send + Sync + 'static {
    move |request: Request<Body>| -> BoxFuture<'static, Response> {
        let handler = handler.clone();
        let ctx = context_for(&request, route.clone());
        Box::pin(async move {
            let request_id = ctx.request_id.clone();
            let route = ctx.route.clone();
            match handler(ctx, request).await {
                Ok(response) => response,
                Err(err) => {
                    tracing::debug!(request_id = %request_id, route = %route, error = %err, "HTTP handler returned an error");
                    response::handler_error_response(&err)
                }
            }
        })
    }
}

impl std::fmt::Debug for HttpRouteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRouteTable").field("routes", &self.routes()).finish()
    }
}
