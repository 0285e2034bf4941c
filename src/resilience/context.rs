//! Cancellable execution context handed to every operation.
//!
//! # Responsibilities
//! - Carry a cancellation signal from the caller down into isolated tasks
//! - Carry an optional deadline; children keep the earlier of the two
//!
//! # Design Decisions
//! - Cancellation uses `tokio_util`'s `CancellationToken` so a child can be
//!   cancelled on its own without affecting the parent
//! - Deadlines are `tokio::time::Instant` so they line up with `sleep_until`

use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::resilience::error::Error;

/// Execution context for a single call.
#[derive(Debug, Clone)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Deadline>,
}

#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Instant,
    /// The timeout that produced `at`, reported in `DeadlineExceeded`.
    budget: Duration,
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// A context driven by an externally owned cancellation token.
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Derive a child that is cancelled with its parent.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Derive a child whose deadline is at most `timeout` from now.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Deadline {
            at: Instant::now() + timeout,
            budget: timeout,
        };
        let deadline = match self.deadline {
            Some(existing) if existing.at < candidate.at => existing,
            _ => candidate,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline.map(|d| d.at)
    }

    /// Time left before the deadline, if one is set.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|d| d.at.saturating_duration_since(Instant::now()))
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel this context and every context derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Resolves once the context is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Resolves when the context is cancelled or its deadline passes,
    /// yielding the matching error.
    pub(crate) async fn done(&self) -> Error {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => Error::Cancelled,
                    _ = tokio::time::sleep_until(deadline.at) => {
                        Error::DeadlineExceeded(deadline.budget)
                    }
                }
            }
            None => {
                self.token.cancelled().await;
                Error::Cancelled
            }
        }
    }

    /// The error describing why this context is finished, if it is.
    pub(crate) fn err(&self) -> Option<Error> {
        if self.token.is_cancelled() {
            return Some(Error::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline.at => {
                Some(Error::DeadlineExceeded(deadline.budget))
            }
            _ => None,
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}
