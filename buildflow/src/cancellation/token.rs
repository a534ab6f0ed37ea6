//! Cancellation token shared by a run and its executing tasks.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;
use tracing::debug;

/// Cooperative cancellation for one build set.
///
/// The scheduler and every in-flight executor hold the same token. The first
/// caller of [`CancellationToken::cancel`] sets the reason; later calls are
/// no-ops. Executors race [`CancellationToken::cancelled`] against their
/// driver's completion instead of polling.
#[derive(Default)]
pub struct CancellationToken {
    flag: AtomicBool,
    reason: RwLock<Option<String>>,
    waiters: Notify,
}

impl CancellationToken {
    /// Creates a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the run. Returns false if it was already cancelled.
    pub fn cancel(&self, reason: impl Into<String>) -> bool {
        // The reason is written before the flag so a woken waiter always sees it.
        let mut slot = self.reason.write();
        if self.flag.load(Ordering::SeqCst) {
            return false;
        }
        let reason = reason.into();
        debug!(reason = %reason, "Build set cancellation requested");
        *slot = Some(reason);
        self.flag.store(true, Ordering::SeqCst);
        drop(slot);

        self.waiters.notify_waiters();
        true
    }

    /// Whether the run was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Why the run was cancelled.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.reason.read().clone()
    }

    /// Completes once the token is cancelled.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.waiters.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.reason() {
            Some(reason) => write!(f, "CancellationToken(cancelled: {reason})"),
            None => write!(f, "CancellationToken(active)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_fresh_token_is_active() {
        let token = CancellationToken::new();

        assert!(!token.is_cancelled());
        assert_eq!(token.reason(), None);
        assert_eq!(format!("{token:?}"), "CancellationToken(active)");
    }

    #[test]
    fn test_first_reason_is_kept() {
        let token = CancellationToken::new();

        assert!(token.cancel("cancelled by alice"));
        assert!(!token.cancel("cancelled by bob"));
        assert!(token.is_cancelled());
        assert_eq!(token.reason().as_deref(), Some("cancelled by alice"));
    }

    #[tokio::test]
    async fn test_cancel_wakes_every_waiter() {
        let token = Arc::new(CancellationToken::new());
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let token = token.clone();
                tokio::spawn(async move {
                    token.cancelled().await;
                    token.reason()
                })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel("shutdown");

        for waiter in waiters {
            let reason = tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .expect("waiter woke")
                .unwrap();
            assert_eq!(reason.as_deref(), Some("shutdown"));
        }
    }

    #[tokio::test]
    async fn test_cancelled_after_the_fact_resolves() {
        let token = CancellationToken::new();
        token.cancel("early");

        tokio::time::timeout(Duration::from_millis(100), token.cancelled())
            .await
            .expect("already cancelled");
    }
}
