//! Retry logic.
//!
//! # Responsibilities
//! - Re-invoke a failing call under a backoff schedule
//! - Stop at once on a permanent error and return it unchanged
//! - Stay responsive to cancellation and deadlines while waiting
//!
//! # Design Decisions
//! - `max_retries` counts retries after the first attempt; negative means
//!   no limit other than the context
//! - Exhaustion wraps the last error so callers can tell "gave up" apart
//!   from a single failure

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;

use crate::resilience::backoff::{calculate_backoff, BackoffKind};
use crate::resilience::context::Context;
use crate::resilience::error::{Error, Result};
use crate::resilience::operation::Call;

/// Retry strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    pub backoff: BackoffKind,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound for growing schedules.
    pub max_delay: Duration,
    /// Retries allowed after the first attempt. Negative is unlimited.
    pub max_retries: i64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffKind::Constant,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            max_retries: 3,
        }
    }
}

impl RetryConfig {
    pub fn constant(delay: Duration, max_retries: i64) -> Self {
        Self {
            backoff: BackoffKind::Constant,
            base_delay: delay,
            max_delay: delay,
            max_retries,
        }
    }

    pub fn exponential(base_delay: Duration, max_delay: Duration, max_retries: i64) -> Self {
        Self {
            backoff: BackoffKind::Exponential,
            base_delay,
            max_delay,
            max_retries,
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.max_retries < 0
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        calculate_backoff(self.backoff, retry, self.base_delay, self.max_delay)
    }

    fn exhausted(&self, attempts: u32) -> bool {
        !self.is_unbounded() && i64::from(attempts) > self.max_retries
    }
}

/// Wrap `inner` so transient failures are retried.
pub(crate) fn layer<T>(config: RetryConfig, inner: Call<T>) -> Call<T>
where
    T: Send + 'static,
{
    let config = Arc::new(config);
    Arc::new(move |ctx: Context| -> BoxFuture<'static, Result<T>> {
        Box::pin(run(Arc::clone(&config), ctx, Arc::clone(&inner)))
    })
}

async fn run<T>(config: Arc<RetryConfig>, ctx: Context, inner: Call<T>) -> Result<T>
where
    T: Send + 'static,
{
    let mut attempts: u32 = 0;

    loop {
        if let Some(stop) = ctx.err() {
            return Err(stop);
        }
        attempts = attempts.saturating_add(1);

        let err = match inner(ctx.clone()).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if err.is_permanent() {
            tracing::debug!(attempt = attempts, error = %err, "Permanent error, not retrying");
            return Err(err);
        }

        if config.exhausted(attempts) {
            tracing::warn!(attempts, error = %err, "Retries exhausted");
            return Err(Error::RetryExhausted {
                attempts,
                last: Box::new(err),
            });
        }

        let delay = config.delay_for(attempts);
        tracing::info!(attempt = attempts, delay = ?delay, error = %err, "Retrying operation");

        tokio::select! {
            biased;
            stop = ctx.done() => return Err(stop),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
