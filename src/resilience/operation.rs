//! The unit-of-work contract.
//!
//! An operation is any `Fn(Context) -> impl Future<Output = OperationResult<T>>`
//! that can be shared across tasks. It must be callable more than once because
//! the retry layer re-invokes it, and it should watch the context it is given
//! so abandoned work stops early.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::TryFutureExt;

use crate::resilience::context::Context;
use crate::resilience::error::{Error, OperationError, Result};

/// What an operation returns.
pub type OperationResult<T> = std::result::Result<T, OperationError>;

/// A layered callable. Every layer takes one of these and returns another.
pub(crate) type Call<T> = Arc<dyn Fn(Context) -> BoxFuture<'static, Result<T>> + Send + Sync>;

/// Turn a raw operation into the innermost layer.
pub(crate) fn lift<T, F, Fut>(operation: F) -> Call<T>
where
    T: Send + 'static,
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = OperationResult<T>> + Send + 'static,
{
    Arc::new(move |ctx: Context| -> BoxFuture<'static, Result<T>> {
        Box::pin(operation(ctx).map_err(Error::from))
    })
}
