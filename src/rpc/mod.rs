//! Structured-RPC front-end.
//!
//! # Wire Format
//! One JSON-RPC 2.0 message per line. Methods are named `service/method`.
//!
//! ```text
//! → {"jsonrpc":"2.0","id":1,"method":"helper/Ping"}
//! ← {"jsonrpc":"2.0","id":1,"result":{"timestamp_ms":1700000000000}}
//! ```
//!
//! # Error Codes
//! | Code   | Meaning                          |
//! |--------|----------------------------------|
//! | -32700 | line is not valid JSON           |
//! | -32600 | not a request, or frame too big  |
//! | -32601 | no handler for `service/method`  |
//! | -32602 | params rejected by the handler   |
//! | -32603 | handler failed or panicked       |
//! | -32004 | handler reported not found       |
//! | -32003 | handler reported unavailable     |

pub mod error;
pub mod protocol;
pub mod router;
pub mod server;
pub mod transport;

pub use protocol::{RpcError, RpcId, RpcRequest, RpcResponse};
pub use router::{handler_fn, RpcHandler, RpcRouter};
pub use server::{RpcFrontEnd, RpcSettings};
