//! Timeout enforcement.
//!
//! # Responsibilities
//! - Bound the total time spent below this layer
//! - Run the wrapped call as an isolated task so a hung operation cannot
//!   hold up the deadline check
//! - Turn a panic inside the task into an error at the task boundary
//!
//! # Design Decisions
//! - The result comes back through a `oneshot`: a late send after the
//!   receiver is gone fails immediately and the value is dropped
//! - On deadline or cancellation the child context is cancelled and the task
//!   aborted, so the work stops instead of only the wait
//! - A zero timeout disables the layer

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tokio_util::sync::DropGuard;
use tracing::Instrument;

use crate::resilience::context::Context;
use crate::resilience::error::{Error, Result};
use crate::resilience::operation::Call;

/// Wrap `inner` so it is abandoned once `timeout` elapses.
pub(crate) fn layer<T>(timeout: Duration, inner: Call<T>) -> Call<T>
where
    T: Send + 'static,
{
    if timeout.is_zero() {
        return inner;
    }

    Arc::new(move |ctx: Context| -> BoxFuture<'static, Result<T>> {
        Box::pin(run(timeout, ctx, Arc::clone(&inner)))
    })
}

/// Stops the isolated task when the waiting side goes away.
struct TaskGuard {
    abort: AbortHandle,
    _cancel: DropGuard,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.abort.abort();
    }
}

async fn run<T>(timeout: Duration, ctx: Context, inner: Call<T>) -> Result<T>
where
    T: Send + 'static,
{
    let child = ctx.with_timeout(timeout);
    let (tx, rx) = oneshot::channel();

    let task_ctx = child.clone();
    let handle = tokio::spawn(async move {
        // Building the future runs caller code too, so it happens inside the guard.
        let outcome = AssertUnwindSafe(async move { inner(task_ctx).await })
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                let message = panic_message(payload.as_ref());
                tracing::error!(panic = %message, "Operation panicked in isolated task");
                Err(Error::Panicked(message))
            });
        // The receiver is gone if the deadline already fired.
        let _ = tx.send(outcome);
    }
    .in_current_span());

    let _guard = TaskGuard {
        abort: handle.abort_handle(),
        _cancel: child.token().clone().drop_guard(),
    };

    tokio::select! {
        biased;
        received = rx => match received {
            Ok(outcome) => outcome,
            // Panics are reported through the channel, so the only way the
            // sender goes away unsent is the runtime shutting down.
            Err(_) => Err(Error::Cancelled),
        },
        err = child.done() => {
            if let Error::DeadlineExceeded(budget) = &err {
                tracing::warn!(timeout = ?budget, "Operation timed out");
            }
            Err(err)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::error::OperationError;
    use crate::resilience::operation::lift;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::time::Instant;

    #[tokio::test]
    async fn test_fast_operation_completes() {
        let call = layer(
            Duration::from_secs(1),
            lift(|_ctx| async { Ok::<_, OperationError>(42) }),
        );
        assert_eq!(call(Context::background()).await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_operation_error_passes_through() {
        let call = layer(
            Duration::from_secs(1),
            lift(|_ctx| async { Err::<u32, _>(OperationError::permanent("rejected")) }),
        );
        let err = call(Context::background()).await.unwrap_err();
        assert!(matches!(err, Error::Operation(ref e) if e.is_permanent()));
    }

    #[tokio::test]
    async fn test_slow_operation_hits_deadline() {
        let call = layer(
            Duration::from_millis(50),
            lift(|_ctx| async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok::<_, OperationError>(())
            }),
        );

        let started = Instant::now();
        let err = call(Context::background()).await.unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, Error::DeadlineExceeded(d) if d == Duration::from_millis(50)));
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_millis(150), "took {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_deadline_cancels_inner_context() {
        let observed = Arc::new(AtomicBool::new(false));
        let flag = observed.clone();
        let call = layer(
            Duration::from_millis(20),
            lift(move |ctx: Context| {
                let flag = flag.clone();
                async move {
                    // Watch from outside the isolated task, which gets aborted.
                    let watched = ctx.clone();
                    tokio::spawn(async move {
                        watched.cancelled().await;
                        flag.store(true, Ordering::SeqCst);
                    });
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    Ok::<_, OperationError>(())
                }
            }),
        );

        let ctx = Context::background();
        let err = call(ctx.clone()).await.unwrap_err();
        assert!(matches!(err, Error::DeadlineExceeded(_)));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(observed.load(Ordering::SeqCst));
        assert!(!ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_panic_becomes_error() {
        let call = layer(
            Duration::from_secs(1),
            lift(|_ctx| async {
                if true {
                    panic!("invalid state");
                }
                Ok::<u32, OperationError>(1)
            }),
        );
        let err = call(Context::background()).await.unwrap_err();
        assert!(matches!(err, Error::Panicked(ref msg) if msg == "invalid state"));
    }

    #[tokio::test]
    async fn test_panic_while_building_future_becomes_error() {
        let call = layer(
            Duration::from_secs(1),
            lift(|_ctx| -> BoxFuture<'static, crate::resilience::OperationResult<u32>> {
                panic!("bad input before future");
            }),
        );
        let err = call(Context::background()).await.unwrap_err();
        assert!(matches!(err, Error::Panicked(ref msg) if msg == "bad input before future"));
    }

    #[tokio::test]
    async fn test_ambient_cancellation_wins() {
        let call = layer(
            Duration::from_secs(5),
            lift(|_ctx| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, OperationError>(())
            }),
        );
        let ctx = Context::background();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        let err = call(ctx).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_zero_timeout_is_passthrough() {
        let call = layer(
            Duration::ZERO,
            lift(|_ctx| async {
                tokio::time::sleep(Duration::from_millis(30)).await;
                Ok::<_, OperationError>("done")
            }),
        );
        assert_eq!(call(Context::background()).await.unwrap(), "done");
    }
}
