use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The sidecar answered with a JSON-RPC error object.
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The sidecar answered with a non-success HTTP status.
    #[error("HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    /// The connection closed before a response arrived.
    #[error("connection closed")]
    Closed,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PingReply {
    pub timestamp_ms: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendMessageReply {
    pub timestamp_ms: u64,
    pub message: String,
}

/// Client for a running sidecar. RPC calls open a fresh connection each.
pub struct SidecarClient {
    client: Client,
    rpc_addr: String,
    http_url: String,
}

impl SidecarClient {
    /// `rpc_addr` is `host:port`; `http_url` is a base URL such as
    /// `http://127.0.0.1:8768`.
    pub fn new(rpc_addr: &str, http_url: &str) -> Self {
        Self {
            client: Client::new(),
            rpc_addr: rpc_addr.to_string(),
            http_url: http_url.trim_end_matches('/').to_string(),
        }
    }

    /// Client for a sidecar on 127.0.0.1.
    pub fn local(rpc_port: u16, http_port: u16) -> Self {
        Self::new(
            &format!("127.0.0.1:{}", rpc_port),
            &format!("http://127.0.0.1:{}", http_port),
        )
    }

    /// Call `service/method` over a one-shot connection.
    pub async fn call(&self, service: &str, method: &str, params: Value) -> Result<Value, ClientError> {
        let mut conn = RpcConnection::connect(&self.rpc_addr).await?;
        conn.call(service, method, params).await
    }

    pub async fn ping(&self) -> Result<PingReply, ClientError> {
        let value = self.call("helper", "Ping", json!({})).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn send_message(&self, message: &str) -> Result<SendMessageReply, ClientError> {
        let value = self.call("chat", "SendMessage", json!({ "message": message })).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// `GET /healthz`
    pub async fn health(&self) -> Result<Value, ClientError> {
        self.get_json("/healthz").await
    }

    /// GET a path on the HTTP front-end and decode the JSON body.
    pub async fn get_json(&self, path: &str) -> Result<Value, ClientError> {
        let resp = self.client.get(format!("{}{}", self.http_url, path)).send().await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(serde_json::from_str(&text)?)
    }
}

/// A persistent JSON-RPC connection.
///
/// Calls are sequential: each waits for the response carrying its id.
pub struct RpcConnection {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
    next_id: i64,
}

impl RpcConnection {
    pub async fn connect(addr: &str) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (read_half, writer) = stream.into_split();
        Ok(Self {
            lines: BufReader::new(read_half).lines(),
            writer,
            next_id: 1,
        })
    }

    /// Call `service/method` and return its result.
    pub async fn call(&mut self, service: &str, method: &str, params: Value) -> Result<Value, ClientError> {
        let id = self.next_id;
        self.next_id += 1;
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": format!("{}/{}", service, method),
            "params": params,
        });
        self.send_line(&request.to_string()).await?;

        loop {
            let response = self.read_response().await?;
            if response.get("id").and_then(Value::as_i64) != Some(id) {
                continue;
            }
            return into_result(response);
        }
    }

    /// Send a notification. No response is expected.
    pub async fn notify(&mut self, service: &str, method: &str, params: Value) -> Result<(), ClientError> {
        let request = json!({
            "jsonrpc": "2.0",
            "method": format!("{}/{}", service, method),
            "params": params,
        });
        self.send_line(&request.to_string()).await
    }

    /// Write a raw line and return the next response as-is.
    pub async fn send_raw(&mut self, line: &str) -> Result<Value, ClientError> {
        self.send_line(line).await?;
        self.read_response().await
    }

    async fn send_line(&mut self, line: &str) -> Result<(), ClientError> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn read_response(&mut self) -> Result<Value, ClientError> {
        loop {
            match self.lines.next_line().await? {
                None => return Err(ClientError::Closed),
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => return Ok(serde_json::from_str(&line)?),
            }
        }
    }
}

fn into_result(mut response: Value) -> Result<Value, ClientError> {
    if let Some(error) = response.get("error") {
        return Err(ClientError::Rpc {
            code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        });
    }
    Ok(response.get_mut("result").map(Value::take).unwrap_or(Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_objects_become_rpc_errors() {
        let err = into_result(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32601, "message": "Method not found: a/b" }
        }))
        .unwrap_err();
        match err {
            ClientError::Rpc { code, message } => {
                assert_eq!(code, -32601);
                assert!(message.contains("a/b"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn result_is_extracted() {
        let value = into_result(json!({ "jsonrpc": "2.0", "id": 1, "result": { "ok": true } })).unwrap();
        assert_eq!(value["ok"], true);
    }
}
