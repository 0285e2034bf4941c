//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call for a target:
//!     → timeouts.rs (isolated task raced against the deadline)
//!     → retries.rs (re-invoke transient failures with backoff.rs delays)
//!     → circuit_breaker.rs (admit or fail fast, account every attempt)
//!     → operation.rs (caller's unit of work, given a context.rs)
//! ```
//!
//! # Design Decisions
//! - Layers are plain callables wrapping callables; the order is fixed by
//!   the executor, not by the caller
//! - Every attempt passes the breaker, so failures trip it mid-retry-loop
//! - A breaker rejection is permanent and ends the retry loop
//! - Each layer only produces the errors it owns (error.rs)

pub mod backoff;
pub mod circuit_breaker;
pub mod context;
pub mod error;
pub mod operation;
pub mod retries;
pub mod timeouts;

pub use backoff::BackoffKind;
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState};
pub use context::Context;
pub use error::{BoxError, Error, ErrorKind, OperationError, Result};
pub use operation::OperationResult;
pub use retries::RetryConfig;
