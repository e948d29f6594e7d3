//! Cooperative cancellation scopes

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct ScopeInner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Revocable handle shared between the orchestrator and the tasks it spawns.
///
/// Clones observe the same state. Cancelling twice, or cancelling after the
/// work settled, is a no-op.
#[derive(Clone, Debug, Default)]
pub struct CancelScope {
    inner: Arc<ScopeInner>,
}

impl CancelScope {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            self.inner.notify.notify_waiters();
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called
    pub async fn cancelled(&self) {
        loop {
            // Register before checking the flag so a concurrent cancel is not missed
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn cancel_is_idempotent() {
        let scope = CancelScope::new();
        assert!(!scope.is_cancelled());
        scope.cancel();
        scope.cancel();
        assert!(scope.is_cancelled());
    }

    #[test]
    fn scopes_are_independent() {
        let active = CancelScope::new();
        let background = CancelScope::new();
        active.cancel();
        assert!(!background.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_wakes_waiters() {
        let scope = CancelScope::new();
        let waiter = scope.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });

        tokio::task::yield_now().await;
        scope.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn cancelled_returns_immediately_when_already_cancelled() {
        let scope = CancelScope::new();
        scope.cancel();
        tokio::time::timeout(Duration::from_millis(100), scope.cancelled())
            .await
            .expect("already cancelled");
    }
}
