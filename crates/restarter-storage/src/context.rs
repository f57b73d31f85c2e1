//! Per-call cancellation and deadline carried into store operations.

use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::StoreError;

/// Cancellation signal and optional deadline for one logical request.
///
/// Cloning shares the same token, so cancelling any clone cancels them all.
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl QueryContext {
    /// Creates a context that is never cancelled and has no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an absolute deadline.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets a deadline relative to now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Returns the deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancels every operation running under this context.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns a guard that cancels this context when dropped.
    pub fn drop_guard(&self) -> DropGuard {
        self.cancel.clone().drop_guard()
    }

    /// Returns true once the context has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Returns the error an operation should fail with right now, if any.
    pub fn check(&self) -> Result<(), StoreError> {
        if self.cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(StoreError::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> StoreError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = self.cancel.cancelled() => StoreError::Cancelled,
                _ = tokio::time::sleep_until(deadline) => StoreError::DeadlineExceeded,
            },
            None => {
                self.cancel.cancelled().await;
                StoreError::Cancelled
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_context_is_live() {
        assert!(QueryContext::new().check().is_ok());
    }

    #[test]
    fn test_cancel_is_shared_by_clones() {
        let ctx = QueryContext::new();
        let clone = ctx.clone();
        clone.cancel();
        assert!(ctx.is_cancelled());
        assert!(matches!(ctx.check(), Err(StoreError::Cancelled)));
    }

    #[tokio::test]
    async fn test_expired_deadline() {
        let ctx = QueryContext::new().with_deadline(Instant::now());
        assert!(matches!(ctx.check(), Err(StoreError::DeadlineExceeded)));
        assert!(matches!(ctx.done().await, StoreError::DeadlineExceeded));
    }

    #[test]
    fn test_drop_guard_cancels() {
        let ctx = QueryContext::new();
        let guard = ctx.drop_guard();
        assert!(!ctx.is_cancelled());
        drop(guard);
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_done_resolves_on_cancel() {
        let ctx = QueryContext::new().with_timeout(Duration::from_secs(60));
        let waiter = ctx.clone();
        let handle = tokio::spawn(async move { waiter.done().await });
        ctx.cancel();
        assert!(matches!(handle.await.unwrap(), StoreError::Cancelled));
    }
}
