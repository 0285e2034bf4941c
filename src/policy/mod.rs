//! Policy assembly subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     config entries (or direct calls)
//!     → provider.rs (register timeouts, retries, breakers, targets)
//!
//! Per call:
//!     target name
//!     → provider.rs (resolve bound names into a types.rs Policy)
//!     → executor.rs (wrap the operation, fixed layer order)
//!     → value or resilience::Error
//! ```
//!
//! # Design Decisions
//! - The provider is an explicit object passed to consumers, not a global
//! - Policies are immutable; changing a target means registering a new one
//! - An absent policy is a pass-through with no added layer

pub mod executor;
pub mod provider;
pub mod types;

pub use executor::Executor;
pub use provider::{ComponentKind, Provider, ProviderError};
pub use types::{Policy, PolicySummary, TargetBinding};
