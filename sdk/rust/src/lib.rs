//! Client for the sidecar's JSON-RPC and HTTP front-ends.

pub mod client;

pub use client::{ClientError, PingReply, RpcConnection, SendMessageReply, SidecarClient};
