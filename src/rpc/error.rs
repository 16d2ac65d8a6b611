//! JSON-RPC error codes.

use crate::frontend::HandlerError;

/// Standard JSON-RPC error: invalid JSON
pub const PARSE_ERROR: i32 = -32700;
/// Standard JSON-RPC error: not a valid request object
pub const INVALID_REQUEST: i32 = -32600;
/// Standard JSON-RPC error: method does not exist
pub const METHOD_NOT_FOUND: i32 = -32601;
/// Standard JSON-RPC error: invalid method parameters
pub const INVALID_PARAMS: i32 = -32602;
/// Standard JSON-RPC error: internal error
pub const INTERNAL_ERROR: i32 = -32603;

/// Handler reported a missing resource.
pub const NOT_FOUND: i32 = -32004;
/// Handler or its dependency is temporarily unavailable.
pub const UNAVAILABLE: i32 = -32003;

/// Map a handler error onto a JSON-RPC error code.
pub fn code_for(err: &HandlerError) -> i32 {
    match err {
        HandlerError::InvalidRequest(_) => INVALID_PARAMS,
        HandlerError::NotFound(_) => NOT_FOUND,
        HandlerError::Unavailable(_) => UNAVAILABLE,
        HandlerError::Internal(_) => INTERNAL_ERROR,
    }
}
