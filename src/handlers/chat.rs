//! `chat` RPC service.

use serde::{Deserialize, Serialize};

use crate::frontend::HandlerError;
use crate::handlers::timestamp_ms;
use crate::rpc::{handler_fn, RpcHandler};

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SendMessageResponse {
    pub timestamp_ms: u64,
    pub message: String,
}

/// `chat/SendMessage`: acknowledges the message with a timestamp.
pub fn send_message() -> RpcHandler {
    handler_fn(|ctx, req: SendMessageRequest| async move {
        let timestamp_ms = timestamp_ms();
        tracing::debug!(request_id = %ctx.request_id, len = req.message.len(), "Chat message received");
        Ok::<_, HandlerError>(SendMessageResponse {
            timestamp_ms,
            message: format!("Received: {}, at {}", req.message, timestamp_ms),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::{Protocol, RequestContext};

    fn ctx() -> RequestContext {
        RequestContext::new(Protocol::Rpc, "chat/SendMessage")
    }

    #[tokio::test]
    async fn echoes_message_with_timestamp() {
        let value = send_message()(ctx(), serde_json::json!({ "message": "hello" }))
            .await
            .unwrap();
        let response: SendMessageResponse = serde_json::from_value(value).unwrap();
        assert_eq!(
            response.message,
            format!("Received: hello, at {}", response.timestamp_ms)
        );
    }

    #[tokio::test]
    async fn missing_message_is_invalid() {
        let err = send_message()(ctx(), serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, HandlerError::InvalidRequest(_)));
    }
}
