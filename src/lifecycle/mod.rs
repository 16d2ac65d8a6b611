//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Bind both ports → Build front-ends → Mount into Supervisor → Attach handlers
//!
//! Supervision (supervisor.rs):
//!     start() → one task per front-end → first failure stops the rest
//!
//! Shutdown (shutdown.rs, signals.rs):
//!     SIGTERM/SIGINT → shutdown(5s) → stop accepting → drain → force-close → exit
//! ```
//!
//! # Design Decisions
//! - Bind failures are fatal and happen before anything is served
//! - Shutdown has a deadline; what is left afterwards is aborted
//! - Every stop, signal-driven or failure-driven, goes through `graceful_stop`

pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod supervisor;

pub use shutdown::{run_until_shutdown, DEFAULT_FAILURE_STOP_TIMEOUT, SIGNAL_SHUTDOWN_DEADLINE};
pub use signals::{shutdown_signal, ShutdownSignal};
pub use startup::{bootstrap, SidecarServer, StartupError};
pub use supervisor::{Supervisor, SupervisorBuilder, SupervisorError, SupervisorState};
