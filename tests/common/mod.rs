//! Shared utilities for integration tests.
//!
//! Every test uses its own fixed loopback ports so tests can run in
//! parallel within one binary.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::task::JoinHandle;

use sidecar_helper::config::{PortConfig, SidecarConfig};
use sidecar_helper::frontend::HandlerError;
use sidecar_helper::handlers::{default_registrar, Registrar};
use sidecar_helper::http;
use sidecar_helper::lifecycle::{SidecarServer, SupervisorError, SupervisorState};
use sidecar_helper::rpc;

pub fn config(rpc: u16, http: u16) -> SidecarConfig {
    SidecarConfig {
        port: PortConfig::new(rpc, http),
        ..SidecarConfig::default()
    }
}

/// Built-in handlers plus the ones tests need to misbehave on purpose:
///
/// - `test/Sleep` `{ "ms": n }` sleeps before answering
/// - `test/Panic` panics
/// - `GET /test/sleep?ms=n` sleeps before answering
/// - `GET /test/panic` panics
pub fn test_registrar() -> Registrar {
    default_registrar()
        .rpc(
            "test",
            "Sleep",
            rpc::handler_fn(|_ctx, params: Value| async move {
                let ms = params.get("ms").and_then(Value::as_u64).unwrap_or(0);
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok::<_, HandlerError>(json!({ "slept_ms": ms }))
            }),
        )
        .rpc(
            "test",
            "Panic",
            rpc::handler_fn(|_ctx, _params: Value| async move {
                if true {
                    panic!("rpc handler exploded");
                }
                Ok::<Value, HandlerError>(Value::Null)
            }),
        )
        .http(
            axum::http::Method::GET,
            "/test/sleep",
            http::handler_fn(|_ctx, req| async move {
                let ms = req
                    .uri()
                    .query()
                    .and_then(|q| q.strip_prefix("ms="))
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(0);
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok::<_, HandlerError>(axum::Json(json!({ "slept_ms": ms })))
            }),
        )
        .http(
            axum::http::Method::GET,
            "/test/panic",
            http::handler_fn(|_ctx, _req| async move {
                if true {
                    panic!("http handler exploded");
                }
                Ok::<_, HandlerError>(())
            }),
        )
}

/// A started sidecar and the task running `start()`.
pub struct Running {
    pub server: Arc<SidecarServer>,
    pub task: JoinHandle<Result<(), SupervisorError>>,
}

impl Running {
    pub fn rpc_addr(&self) -> SocketAddr {
        self.server.rpc_addr()
    }

    pub fn http_url(&self) -> String {
        format!("http://{}", self.server.http_addr())
    }

    pub fn client(&self) -> sidecar_client::SidecarClient {
        sidecar_client::SidecarClient::new(&self.rpc_addr().to_string(), &self.http_url())
    }
}

/// Bind, attach [`test_registrar`] and start serving.
pub async fn start(rpc: u16, http: u16) -> Running {
    start_with(config(rpc, http)).await
}

pub async fn start_with(config: SidecarConfig) -> Running {
    let server = SidecarServer::bind(&config).expect("bind");
    test_registrar().attach(&server).expect("attach handlers");
    start_server(server).await
}

pub async fn start_server(server: SidecarServer) -> Running {
    let server = Arc::new(server);
    let task = {
        let server = server.clone();
        tokio::spawn(async move { server.start().await })
    };
    wait_until_serving(&server).await;
    Running { server, task }
}

pub async fn wait_until_serving(server: &SidecarServer) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while server.state() != SupervisorState::Serving {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("supervisor did not start serving");
}

pub async fn refuses_connections(addr: SocketAddr) -> bool {
    tokio::net::TcpStream::connect(addr).await.is_err()
}
