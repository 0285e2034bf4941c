//! Resilience pipeline library.
//!
//! Wraps arbitrary async operations in named, reusable policies built from a
//! timeout, a retry schedule and a circuit breaker.

pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod policy;
pub mod resilience;

pub use config::schema::PipelineConfig;
pub use lifecycle::Shutdown;
pub use policy::{Executor, Policy, Provider, ProviderError, TargetBinding};
pub use resilience::{
    BackoffKind, CircuitBreakerConfig, CircuitState, Context, Error, ErrorKind, OperationError,
    OperationResult, RetryConfig,
};
