//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → wait_for_shutdown() returns
//!
//! Shutdown (shutdown.rs):
//!     trigger() → subscribers notified
//!               → contexts handed out by context() cancelled
//!               → in-flight executions stop at their next suspension point
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::wait_for_shutdown;
