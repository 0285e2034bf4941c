//! Shared utilities for integration tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use resilience_pipeline::{Context, OperationError, OperationResult};

/// What a scripted operation does on one invocation.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub enum Step {
    Succeed,
    Transient,
    Permanent,
    /// Sleep, then succeed. Returns early if the context is cancelled.
    Sleep(Duration),
    Panic,
}

/// Invocation counter shared with a scripted operation.
#[derive(Debug, Clone, Default)]
pub struct Calls(Arc<AtomicU32>);

impl Calls {
    pub fn count(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Build an operation that follows `script`, then repeats `then` forever.
///
/// Successful invocations return their 1-based invocation number.
#[allow(dead_code)]
pub fn scripted(
    script: Vec<Step>,
    then: Step,
) -> (
    impl Fn(Context) -> BoxFuture<'static, OperationResult<u32>> + Send + Sync + 'static,
    Calls,
) {
    let calls = Calls::default();
    let counter = calls.0.clone();
    let script = Arc::new(script);

    let operation = move |ctx: Context| -> BoxFuture<'static, OperationResult<u32>> {
        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
        let step = script.get(n as usize - 1).cloned().unwrap_or_else(|| then.clone());
        Box::pin(async move {
            match step {
                Step::Succeed => Ok(n),
                Step::Transient => Err(OperationError::transient(format!("attempt {} failed", n))),
                Step::Permanent => Err(OperationError::permanent(format!("attempt {} rejected", n))),
                Step::Sleep(d) => {
                    tokio::select! {
                        _ = ctx.cancelled() => Err(OperationError::permanent("abandoned")),
                        _ = tokio::time::sleep(d) => Ok(n),
                    }
                }
                Step::Panic => panic!("scripted panic on attempt {}", n),
            }
        })
    };

    (operation, calls)
}

/// Operation that always does `step`.
#[allow(dead_code)]
pub fn always(
    step: Step,
) -> (
    impl Fn(Context) -> BoxFuture<'static, OperationResult<u32>> + Send + Sync + 'static,
    Calls,
) {
    scripted(Vec::new(), step)
}

/// Operation that fails transiently `failures` times, then succeeds.
#[allow(dead_code)]
pub fn succeed_after(
    failures: usize,
) -> (
    impl Fn(Context) -> BoxFuture<'static, OperationResult<u32>> + Send + Sync + 'static,
    Calls,
) {
    scripted(vec![Step::Transient; failures], Step::Succeed)
}
