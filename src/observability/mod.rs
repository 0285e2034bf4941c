//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! resilience layers, provider, config watcher:
//!     → tracing events with structured fields
//!     → spans carrying an invocation id per execute
//!
//! logging.rs:
//!     → EnvFilter (RUST_LOG, else configured level)
//!     → fmt layer, pretty or JSON
//! ```
//!
//! # Design Decisions
//! - Library code only emits events; the binary installs the subscriber
//! - Structured logging (JSON) for machine parsing

pub mod logging;
