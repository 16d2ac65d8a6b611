//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Front-ends and the supervisor produce:
//!     → logging.rs (structured log events, request IDs as fields)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (text or JSON)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```

pub mod logging;
pub mod metrics;
