//! `helper` RPC service.

use serde::{Deserialize, Serialize};

use crate::frontend::HandlerError;
use crate::handlers::timestamp_ms;
use crate::rpc::{handler_fn, RpcHandler};

#[derive(Debug, Default, Deserialize)]
pub struct PingRequest {}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PingResponse {
    pub timestamp_ms: u64,
}

/// `helper/Ping`: liveness check answering with the current time.
pub fn ping() -> RpcHandler {
    handler_fn(|_ctx, _req: PingRequest| async move {
        Ok::<_, HandlerError>(PingResponse {
            timestamp_ms: timestamp_ms(),
        })
    })
}
