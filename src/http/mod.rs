//! HTTP/1.1 front-end.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (hyper http1, one task per connection)
//!     → middleware (request ID, trace, metrics, catch-panic, body limit)
//!     → router.rs (axum Router built from the (method, path) table)
//!     → handler, or JSON 404 / 405
//!     → response.rs (HandlerError → status + JSON body)
//! ```

pub mod request;
pub mod response;
pub mod router;
pub mod server;

pub use request::X_REQUEST_ID;
pub use router::{handler_fn, HttpHandler, HttpRouteTable};
pub use server::{HttpFrontEnd, HttpSettings};
