//! Configuration schema definitions.
//!
//! A config file is a flat list of named entries, each tagged by `kind`:
//!
//! ```toml
//! [[entry]]
//! kind = "timeout"
//! name = "fast"
//! duration_ms = 500
//!
//! [[entry]]
//! kind = "target"
//! name = "payments-api"
//! timeout = "fast"
//! ```
//!
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::policy::{ComponentKind, Provider, ProviderError, TargetBinding};
use crate::resilience::{BackoffKind, CircuitBreakerConfig, RetryConfig};

/// Root configuration for the pipeline.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct PipelineConfig {
    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Named timeouts, retries, breakers and targets.
    #[serde(rename = "entry")]
    pub entries: Vec<EntryConfig>,
}

impl PipelineConfig {
    /// Register every entry on `provider`, components before targets.
    ///
    /// Entries whose name is already registered for their kind are skipped,
    /// so the same config can be applied again after a reload. Returns the
    /// number of entries added.
    pub fn apply(&self, provider: &Provider) -> Result<usize, ProviderError> {
        let components = self.entries.iter().filter(|e| e.kind() != ComponentKind::Target);
        let targets = self.entries.iter().filter(|e| e.kind() == ComponentKind::Target);

        let mut added = 0;
        for entry in components.chain(targets) {
            if provider.contains(entry.kind(), entry.name()) {
                tracing::debug!(kind = %entry.kind(), name = %entry.name(), "Entry already registered, skipping");
                continue;
            }
            entry.register(provider)?;
            added += 1;
        }

        Ok(added)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins if set.
    pub log_level: String,

    /// Output format for log lines.
    pub format: LogFormat,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// One named entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryConfig {
    Timeout(TimeoutEntry),
    Retry(RetryEntry),
    CircuitBreaker(CircuitBreakerEntry),
    Target(TargetEntry),
}

impl EntryConfig {
    pub fn name(&self) -> &str {
        match self {
            EntryConfig::Timeout(e) => &e.name,
            EntryConfig::Retry(e) => &e.name,
            EntryConfig::CircuitBreaker(e) => &e.name,
            EntryConfig::Target(e) => &e.name,
        }
    }

    pub fn kind(&self) -> ComponentKind {
        match self {
            EntryConfig::Timeout(_) => ComponentKind::Timeout,
            EntryConfig::Retry(_) => ComponentKind::Retry,
            EntryConfig::CircuitBreaker(_) => ComponentKind::CircuitBreaker,
            EntryConfig::Target(_) => ComponentKind::Target,
        }
    }

    fn register(&self, provider: &Provider) -> Result<(), ProviderError> {
        match self {
            EntryConfig::Timeout(e) => provider.register_timeout(&e.name, e.duration()),
            EntryConfig::Retry(e) => provider.register_retry(&e.name, e.to_retry_config()),
            EntryConfig::CircuitBreaker(e) => {
                provider.register_circuit_breaker(&e.name, e.to_breaker_config())
            }
            EntryConfig::Target(e) => provider.register_target(&e.name, e.binding()),
        }
    }
}

/// Named timeout.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutEntry {
    pub name: String,

    /// Budget for the whole call, retries included, in milliseconds.
    pub duration_ms: u64,
}

impl Default for TimeoutEntry {
    fn default() -> Self {
        Self {
            name: String::new(),
            duration_ms: 30_000,
        }
    }
}

impl TimeoutEntry {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

/// Named retry strategy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryEntry {
    pub name: String,

    /// Backoff schedule (constant, exponential, exponential_jitter).
    pub backoff: BackoffKind,

    /// Delay before the first retry in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for growing schedules in milliseconds.
    pub max_delay_ms: u64,

    /// Retries after the first attempt. Negative retries until the deadline.
    pub max_retries: i64,
}

impl Default for RetryEntry {
    fn default() -> Self {
        let defaults = RetryConfig::default();
        Self {
            name: String::new(),
            backoff: defaults.backoff,
            base_delay_ms: defaults.base_delay.as_millis() as u64,
            max_delay_ms: defaults.max_delay.as_millis() as u64,
            max_retries: defaults.max_retries,
        }
    }
}

impl RetryEntry {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            backoff: self.backoff,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            max_retries: self.max_retries,
        }
    }
}

/// Named circuit breaker.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerEntry {
    pub name: String,

    /// Consecutive failures before opening.
    pub failure_threshold: u32,

    /// Consecutive probe successes before closing.
    pub success_threshold: u32,

    /// Failure counter reset window while closed, in milliseconds. 0 disables it.
    pub interval_ms: u64,

    /// Time spent open before a probe is admitted, in milliseconds.
    pub open_timeout_ms: u64,

    /// Probes allowed in flight while half-open.
    pub half_open_max_requests: u32,
}

impl Default for CircuitBreakerEntry {
    fn default() -> Self {
        let defaults = CircuitBreakerConfig::default();
        Self {
            name: String::new(),
            failure_threshold: defaults.failure_threshold,
            success_threshold: defaults.success_threshold,
            interval_ms: defaults.interval.as_millis() as u64,
            open_timeout_ms: defaults.open_timeout.as_millis() as u64,
            half_open_max_requests: defaults.half_open_max_requests,
        }
    }
}

impl CircuitBreakerEntry {
    pub fn to_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            success_threshold: self.success_threshold,
            interval: Duration::from_millis(self.interval_ms),
            open_timeout: Duration::from_millis(self.open_timeout_ms),
            half_open_max_requests: self.half_open_max_requests,
        }
    }
}

/// Target binding: names of the components to compose.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TargetEntry {
    pub name: String,
    pub timeout: Option<String>,
    pub retry: Option<String>,
    pub circuit_breaker: Option<String>,
}

impl TargetEntry {
    pub fn binding(&self) -> TargetBinding {
        TargetBinding {
            timeout: self.timeout.clone(),
            retry: self.retry.clone(),
            circuit_breaker: self.circuit_breaker.clone(),
        }
    }

    /// Referenced component names, paired with their kind.
    pub fn references(&self) -> impl Iterator<Item = (ComponentKind, &str)> {
        [
            (ComponentKind::Timeout, self.timeout.as_deref()),
            (ComponentKind::Retry, self.retry.as_deref()),
            (ComponentKind::CircuitBreaker, self.circuit_breaker.as_deref()),
        ]
        .into_iter()
        .filter_map(|(kind, name)| name.map(|n| (kind, n)))
    }
}
