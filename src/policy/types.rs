//! Policy value types.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::resilience::{BackoffKind, CircuitBreaker, CircuitBreakerStats, RetryConfig};

/// Immutable bundle of resilience layers for one target.
///
/// A breaker is held by reference and shared with every other policy naming
/// it; timeout and retry settings are owned by value.
#[derive(Debug, Clone, Default)]
pub struct Policy {
    timeout: Option<Duration>,
    retry: Option<RetryConfig>,
    circuit_breaker: Option<Arc<CircuitBreaker>>,
}

impl Policy {
    pub fn new(
        timeout: Option<Duration>,
        retry: Option<RetryConfig>,
        circuit_breaker: Option<Arc<CircuitBreaker>>,
    ) -> Self {
        Self {
            timeout,
            retry,
            circuit_breaker,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.circuit_breaker = Some(breaker);
        self
    }

    /// Timeout, if one applies. A zero duration counts as none.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.filter(|t| !t.is_zero())
    }

    pub fn retry(&self) -> Option<&RetryConfig> {
        self.retry.as_ref()
    }

    pub fn circuit_breaker(&self) -> Option<&Arc<CircuitBreaker>> {
        self.circuit_breaker.as_ref()
    }

    /// True when no layer would be applied.
    pub fn is_empty(&self) -> bool {
        self.timeout().is_none() && self.retry.is_none() && self.circuit_breaker.is_none()
    }

    pub fn summary(&self) -> PolicySummary {
        PolicySummary {
            timeout_ms: self.timeout().map(|t| t.as_millis() as u64),
            retry: self.retry.as_ref().map(|r| RetrySummary {
                backoff: r.backoff,
                base_delay_ms: r.base_delay.as_millis() as u64,
                max_delay_ms: r.max_delay.as_millis() as u64,
                max_retries: r.max_retries,
            }),
            circuit_breaker: self.circuit_breaker.as_ref().map(|cb| cb.stats()),
        }
    }
}

/// Names of the components a target is assembled from.
///
/// An omitted name means the matching layer is absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TargetBinding {
    pub timeout: Option<String>,
    pub retry: Option<String>,
    pub circuit_breaker: Option<String>,
}

impl TargetBinding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, name: impl Into<String>) -> Self {
        self.timeout = Some(name.into());
        self
    }

    pub fn retry(mut self, name: impl Into<String>) -> Self {
        self.retry = Some(name.into());
        self
    }

    pub fn circuit_breaker(mut self, name: impl Into<String>) -> Self {
        self.circuit_breaker = Some(name.into());
        self
    }
}

/// Serializable view of a policy, for tooling output.
#[derive(Debug, Clone, Serialize)]
pub struct PolicySummary {
    pub timeout_ms: Option<u64>,
    pub retry: Option<RetrySummary>,
    pub circuit_breaker: Option<CircuitBreakerStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrySummary {
    pub backoff: BackoffKind,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_retries: i64,
}
