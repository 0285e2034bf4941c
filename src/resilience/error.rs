//! Error taxonomy for the resilience layers.
//!
//! # Classification
//! - Transient: retried by the retry layer, counted by the circuit breaker
//! - Permanent: never retried, still counted by the circuit breaker
//! - DeadlineExceeded / Cancelled: produced by the timeout layer or a retry wait
//! - CircuitOpen: fail fast, the operation was never invoked

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Boxed error type accepted from operations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for pipeline executions.
pub type Result<T> = std::result::Result<T, Error>;

/// Error returned by an operation, tagged with its retry classification.
#[derive(Debug, Error)]
#[error("{source}")]
pub struct OperationError {
    permanent: bool,
    #[source]
    source: BoxError,
}

impl OperationError {
    /// A failure that is expected to go away on its own.
    pub fn transient(source: impl Into<BoxError>) -> Self {
        Self {
            permanent: false,
            source: source.into(),
        }
    }

    /// A failure that retrying cannot fix.
    pub fn permanent(source: impl Into<BoxError>) -> Self {
        Self {
            permanent: true,
            source: source.into(),
        }
    }

    pub fn is_permanent(&self) -> bool {
        self.permanent
    }

    /// Borrow the underlying error.
    pub fn get_ref(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self.source.as_ref()
    }

    /// Consume the wrapper and return the underlying error.
    pub fn into_inner(self) -> BoxError {
        self.source
    }
}

/// Failure category, for callers that branch on recovery strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    DeadlineExceeded,
    Cancelled,
    CircuitOpen,
    RetryExhausted,
    Panicked,
    Operation,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::DeadlineExceeded => "deadline_exceeded",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::CircuitOpen => "circuit_open",
            ErrorKind::RetryExhausted => "retry_exhausted",
            ErrorKind::Panicked => "panicked",
            ErrorKind::Operation => "operation",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by an executor.
#[derive(Debug, Error)]
pub enum Error {
    /// The deadline elapsed before the operation finished.
    #[error("deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),

    /// The ambient context was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// The named circuit breaker rejected the call.
    #[error("circuit breaker '{0}' is open")]
    CircuitOpen(String),

    /// Every allowed attempt failed; carries the last failure.
    #[error("gave up after {attempts} attempts: {last}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        last: Box<Error>,
    },

    /// The operation panicked inside its isolated task.
    #[error("operation panicked: {0}")]
    Panicked(String),

    /// The operation's own error, unchanged.
    #[error(transparent)]
    Operation(#[from] OperationError),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::DeadlineExceeded(_) => ErrorKind::DeadlineExceeded,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::CircuitOpen(_) => ErrorKind::CircuitOpen,
            Error::RetryExhausted { .. } => ErrorKind::RetryExhausted,
            Error::Panicked(_) => ErrorKind::Panicked,
            Error::Operation(_) => ErrorKind::Operation,
        }
    }

    /// Whether the retry layer must stop on this error.
    ///
    /// Only transient operation errors are retried.
    pub fn is_permanent(&self) -> bool {
        match self {
            Error::Operation(e) => e.is_permanent(),
            _ => true,
        }
    }

    /// The operation error at the root of this failure, if any.
    pub fn operation_error(&self) -> Option<&OperationError> {
        match self {
            Error::Operation(e) => Some(e),
            Error::RetryExhausted { last, .. } => last.operation_error(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(!Error::from(OperationError::transient("flaky")).is_permanent());
        assert!(Error::from(OperationError::permanent("bad input")).is_permanent());
        assert!(Error::CircuitOpen("db".into()).is_permanent());
        assert!(Error::DeadlineExceeded(Duration::from_millis(5)).is_permanent());
    }

    #[test]
    fn test_exhausted_exposes_root_cause() {
        let err = Error::RetryExhausted {
            attempts: 3,
            last: Box::new(OperationError::transient("connection reset").into()),
        };
        assert_eq!(err.kind(), ErrorKind::RetryExhausted);
        let root = err.operation_error().unwrap();
        assert_eq!(root.to_string(), "connection reset");
        assert_eq!(err.to_string(), "gave up after 3 attempts: connection reset");
    }
}
