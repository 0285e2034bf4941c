//! Shutdown coordination.

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::resilience::Context;

/// Coordinator for graceful shutdown.
///
/// Long-running loops subscribe to the broadcast channel; executions run
/// under a [`Context`] from [`Shutdown::context`] so they are cancelled too.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
    token: CancellationToken,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            token: CancellationToken::new(),
        }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// A context that is cancelled when shutdown is triggered.
    pub fn context(&self) -> Context {
        Context::with_token(self.token.child_token())
    }

    /// Trigger the shutdown signal. Later calls do nothing.
    pub fn trigger(&self) {
        if self.token.is_cancelled() {
            return;
        }
        tracing::info!(subscribers = self.tx.receiver_count(), "Shutdown triggered");
        self.token.cancel();
        let _ = self.tx.send(());
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Number of active subscribers (tasks still running).
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_trigger_notifies_subscribers_and_contexts() {
        let shutdown = Shutdown::new();
        let mut rx = shutdown.subscribe();
        let ctx = shutdown.context();
        assert_eq!(shutdown.receiver_count(), 1);

        shutdown.trigger();
        shutdown.trigger();

        assert!(rx.recv().await.is_ok());
        assert!(ctx.is_cancelled());
        assert!(shutdown.is_triggered());
    }

    #[test]
    fn test_context_after_trigger_is_cancelled() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        assert!(shutdown.context().is_cancelled());
    }
}
