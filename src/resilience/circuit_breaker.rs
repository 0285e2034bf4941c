//! Circuit breaker for target protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: target assumed down, calls fail fast
//! - Half-Open: a bounded number of probe calls test recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive_failures >= failure_threshold
//! Open → Half-Open: first call after open_timeout (lazy, no timer)
//! Half-Open → Closed: consecutive_successes >= success_threshold
//! Half-Open → Open: any probe fails
//! ```
//!
//! # Design Decisions
//! - One breaker per name, shared by every policy that references it
//! - All reads and transitions happen under a single mutex
//! - `half_open_max_requests` caps probes in flight at the same time
//! - Every transition bumps a generation; outcomes from an older generation
//!   are dropped so a slow call cannot rewrite a newer state

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::Serialize;
use tokio::time::Instant;

use crate::resilience::context::Context;
use crate::resilience::error::{Error, OperationError, Result};
use crate::resilience::operation::Call;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Consecutive probe successes that close it again.
    pub success_threshold: u32,
    /// Counter reset window while closed. Zero never resets.
    pub interval: Duration,
    /// How long to stay open before admitting a probe.
    pub open_timeout: Duration,
    /// Probes allowed in flight while half-open.
    pub half_open_max_requests: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 1,
            interval: Duration::ZERO,
            open_timeout: Duration::from_secs(30),
            half_open_max_requests: 1,
        }
    }
}

impl CircuitBreakerConfig {
    /// Check value ranges, returning the first problem found.
    pub fn validate(&self) -> std::result::Result<(), &'static str> {
        if self.failure_threshold == 0 {
            return Err("failure_threshold must be greater than zero");
        }
        if self.success_threshold == 0 {
            return Err("success_threshold must be greater than zero");
        }
        if self.half_open_max_requests == 0 {
            return Err("half_open_max_requests must be greater than zero");
        }
        Ok(())
    }
}

struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
    window_start: Instant,
    probes_in_flight: u32,
    generation: u64,
}

/// Point-in-time view of a breaker, for logging and tooling.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub probes_in_flight: u32,
    pub total_requests: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub total_rejections: u64,
}

/// Shared, thread-safe circuit breaker.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
    total_requests: AtomicU64,
    total_successes: AtomicU64,
    total_failures: AtomicU64,
    total_rejections: AtomicU64,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

impl CircuitBreaker {
    /// Construct a breaker. Only the provider calls this, after validation.
    pub(crate) fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Arc<Self> {
        let name = name.into();
        tracing::info!(
            breaker = %name,
            failure_threshold = config.failure_threshold,
            open_timeout = ?config.open_timeout,
            "Circuit breaker initialized"
        );

        Arc::new(Self {
            name,
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                opened_at: None,
                window_start: Instant::now(),
                probes_in_flight: 0,
                generation: 0,
            }),
            total_requests: AtomicU64::new(0),
            total_successes: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            total_rejections: AtomicU64::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state. Does not perform the lazy Open → Half-Open move.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        let s = self.lock();
        CircuitBreakerStats {
            name: self.name.clone(),
            state: s.state,
            consecutive_failures: s.consecutive_failures,
            consecutive_successes: s.consecutive_successes,
            probes_in_flight: s.probes_in_flight,
            total_requests: self.total_requests.load(Ordering::Relaxed),
            total_successes: self.total_successes.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            total_rejections: self.total_rejections.load(Ordering::Relaxed),
        }
    }

    /// Run `f` under breaker protection.
    pub async fn call<F, Fut, T>(self: &Arc<Self>, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, OperationError>>,
    {
        let permit = self.admit()?;
        match f().await {
            Ok(value) => {
                permit.success();
                Ok(value)
            }
            Err(e) => {
                permit.failure();
                Err(e.into())
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decide whether a call may proceed.
    pub(crate) fn admit(self: &Arc<Self>) -> Result<Permit> {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();
        let mut s = self.lock();

        match s.state {
            CircuitState::Closed => {
                if !self.config.interval.is_zero()
                    && now.duration_since(s.window_start) >= self.config.interval
                {
                    s.consecutive_failures = 0;
                    s.window_start = now;
                    s.generation += 1;
                }
                Ok(self.permit(s.generation, false))
            }
            CircuitState::Open => {
                let elapsed = s.opened_at.map(|t| now.duration_since(t));
                if elapsed.is_some_and(|e| e >= self.config.open_timeout) {
                    tracing::debug!(breaker = %self.name, "Circuit breaker transitioning to HALF-OPEN");
                    s.state = CircuitState::HalfOpen;
                    s.consecutive_successes = 0;
                    s.probes_in_flight = 1;
                    s.generation += 1;
                    Ok(self.permit(s.generation, true))
                } else {
                    drop(s);
                    Err(self.reject())
                }
            }
            CircuitState::HalfOpen => {
                if s.probes_in_flight < self.config.half_open_max_requests {
                    s.probes_in_flight += 1;
                    Ok(self.permit(s.generation, true))
                } else {
                    drop(s);
                    Err(self.reject())
                }
            }
        }
    }

    fn permit(self: &Arc<Self>, generation: u64, probe: bool) -> Permit {
        Permit {
            breaker: Arc::clone(self),
            generation,
            probe,
            settled: false,
        }
    }

    fn reject(&self) -> Error {
        self.total_rejections.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(breaker = %self.name, "Circuit breaker rejected call");
        Error::CircuitOpen(self.name.clone())
    }

    fn on_success(&self, generation: u64, probe: bool) {
        self.total_successes.fetch_add(1, Ordering::Relaxed);
        let mut s = self.lock();
        if s.generation != generation {
            return;
        }
        if probe {
            s.probes_in_flight = s.probes_in_flight.saturating_sub(1);
        }

        match s.state {
            CircuitState::Closed => s.consecutive_failures = 0,
            CircuitState::HalfOpen => {
                s.consecutive_successes += 1;
                if s.consecutive_successes >= self.config.success_threshold {
                    self.close(&mut s);
                }
            }
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self, generation: u64, probe: bool) {
        self.total_failures.fetch_add(1, Ordering::Relaxed);
        let mut s = self.lock();
        if s.generation != generation {
            return;
        }
        if probe {
            s.probes_in_flight = s.probes_in_flight.saturating_sub(1);
        }

        match s.state {
            CircuitState::Closed => {
                s.consecutive_failures += 1;
                if s.consecutive_failures >= self.config.failure_threshold {
                    self.open(&mut s);
                }
            }
            // Any failure in half-open state reopens the circuit
            CircuitState::HalfOpen => self.open(&mut s),
            CircuitState::Open => {}
        }
    }

    fn release_probe(&self, generation: u64) {
        let mut s = self.lock();
        if s.generation == generation {
            s.probes_in_flight = s.probes_in_flight.saturating_sub(1);
        }
    }

    fn open(&self, s: &mut BreakerState) {
        tracing::warn!(
            breaker = %self.name,
            from = %s.state,
            failures = s.consecutive_failures,
            "Circuit breaker OPENED"
        );
        s.state = CircuitState::Open;
        s.opened_at = Some(Instant::now());
        s.consecutive_successes = 0;
        s.probes_in_flight = 0;
        s.generation += 1;
    }

    fn close(&self, s: &mut BreakerState) {
        tracing::info!(breaker = %self.name, "Circuit breaker CLOSED");
        s.state = CircuitState::Closed;
        s.opened_at = None;
        s.consecutive_failures = 0;
        s.consecutive_successes = 0;
        s.probes_in_flight = 0;
        s.window_start = Instant::now();
        s.generation += 1;
    }
}

/// Admission ticket for one call. Report the outcome with
/// [`Permit::success`] or [`Permit::failure`]; dropping it unreported frees
/// the probe slot without counting an outcome.
pub(crate) struct Permit {
    breaker: Arc<CircuitBreaker>,
    generation: u64,
    probe: bool,
    settled: bool,
}

impl Permit {
    pub(crate) fn success(mut self) {
        self.settled = true;
        self.breaker.on_success(self.generation, self.probe);
    }

    pub(crate) fn failure(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.generation, self.probe);
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        if !self.settled && self.probe {
            self.breaker.release_probe(self.generation);
        }
    }
}

/// Wrap `inner` so every call is admitted and accounted by `breaker`.
pub(crate) fn layer<T>(breaker: Arc<CircuitBreaker>, inner: Call<T>) -> Call<T>
where
    T: Send + 'static,
{
    Arc::new(move |ctx: Context| -> BoxFuture<'static, Result<T>> {
        let breaker = Arc::clone(&breaker);
        let inner = Arc::clone(&inner);
        Box::pin(async move {
            let permit = breaker.admit()?;
            match inner(ctx).await {
                Ok(value) => {
                    permit.success();
                    Ok(value)
                }
                Err(e) => {
                    permit.failure();
                    Err(e)
                }
            }
        })
    })
}
