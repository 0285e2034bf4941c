//! Executor: applies a policy's layers around an operation.
//!
//! # Layer order
//! ```text
//! Timeout (outermost, bounds everything below)
//!     → Retry
//!         → CircuitBreaker (consulted by every attempt)
//!             → Operation
//! ```
//! The order is the same for every partial configuration; an absent layer is
//! simply skipped.

use std::future::Future;
use std::sync::Arc;

use tracing::Instrument;
use uuid::Uuid;

use crate::policy::types::Policy;
use crate::resilience::operation::{lift, Call, OperationResult};
use crate::resilience::{circuit_breaker, retries, timeouts, Context, Error, Result};

/// Runs operations under a fixed policy.
///
/// Cheap to clone; clones share the policy and its breaker.
#[derive(Debug, Clone, Default)]
pub struct Executor {
    target: Option<Arc<str>>,
    policy: Option<Arc<Policy>>,
}

impl Executor {
    /// Build an executor. `None` yields a pass-through.
    pub fn new(policy: Option<Arc<Policy>>) -> Self {
        Self {
            target: None,
            policy,
        }
    }

    /// An executor that adds nothing.
    pub fn passthrough() -> Self {
        Self::default()
    }

    pub(crate) fn for_target(target: &str, policy: Arc<Policy>) -> Self {
        Self {
            target: Some(Arc::from(target)),
            policy: Some(policy),
        }
    }

    pub fn policy(&self) -> Option<&Arc<Policy>> {
        self.policy.as_ref()
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// Run `operation` under the policy.
    ///
    /// Without a policy the operation is awaited directly with `ctx`; its
    /// error comes back as [`Error::Operation`] untouched.
    pub async fn execute<T, F, Fut>(&self, ctx: Context, operation: F) -> Result<T>
    where
        T: Send + 'static,
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = OperationResult<T>> + Send + 'static,
    {
        let Some(policy) = self.policy.as_deref() else {
            return operation(ctx).await.map_err(Error::from);
        };

        let call = compose(policy, lift(operation));
        let span = tracing::info_span!(
            "execute",
            invocation_id = %Uuid::new_v4(),
            target = self.target.as_deref().unwrap_or("-"),
        );

        let result = call(ctx).instrument(span.clone()).await;
        if let Err(e) = &result {
            span.in_scope(|| tracing::debug!(kind = %e.kind(), error = %e, "Execution failed"));
        }
        result
    }
}

impl From<Arc<Policy>> for Executor {
    fn from(policy: Arc<Policy>) -> Self {
        Self::new(Some(policy))
    }
}

impl From<Policy> for Executor {
    fn from(policy: Policy) -> Self {
        Self::new(Some(Arc::new(policy)))
    }
}

/// Wrap `operation` innermost-first so the timeout ends up outermost.
fn compose<T>(policy: &Policy, operation: Call<T>) -> Call<T>
where
    T: Send + 'static,
{
    let mut call = operation;
    if let Some(breaker) = policy.circuit_breaker() {
        call = circuit_breaker::layer(Arc::clone(breaker), call);
    }
    if let Some(retry) = policy.retry() {
        call = retries::layer(retry.clone(), call);
    }
    if let Some(timeout) = policy.timeout() {
        call = timeouts::layer(timeout, call);
    }
    call
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::OperationError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_passthrough_runs_operation_directly() {
        let executor = Executor::passthrough();
        let value = executor
            .execute(Context::background(), |_ctx| async { Ok::<_, OperationError>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);

        let err = executor
            .execute(Context::background(), |_ctx| async {
                Err::<(), _>(OperationError::transient("refused"))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Operation(ref e) if !e.is_permanent()));
        assert_eq!(err.to_string(), "refused");
    }

    #[tokio::test]
    async fn test_passthrough_keeps_ambient_context() {
        let ctx = Context::background().with_timeout(Duration::from_secs(3));
        let deadline = ctx.deadline();
        let seen = Executor::passthrough()
            .execute(ctx, |inner: Context| async move { Ok::<_, OperationError>(inner.deadline()) })
            .await
            .unwrap();
        assert_eq!(seen, deadline);
    }

    #[tokio::test]
    async fn test_empty_policy_behaves_like_passthrough() {
        let executor = Executor::from(Policy::default());
        let value = executor
            .execute(Context::background(), |_ctx| async { Ok::<_, OperationError>("ok") })
            .await
            .unwrap();
        assert_eq!(value, "ok");
    }

    #[tokio::test]
    async fn test_timeout_bounds_all_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let policy = Policy::default()
            .with_timeout(Duration::from_millis(80))
            .with_retry(crate::resilience::RetryConfig::constant(Duration::from_millis(30), 100));

        let err = Executor::from(policy)
            .execute(Context::background(), move |_ctx| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(OperationError::transient("down")) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::DeadlineExceeded(_)));
        let attempts = calls.load(Ordering::SeqCst);
        assert!((2..=4).contains(&attempts), "attempts = {}", attempts);
    }
}
