//! Per-call context passed through to the store
//!
//! Filters never look at the context themselves. Stores use it to bound how
//! long a batch may take and to notice that the caller gave up.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

/// Deadline and cancellation for one or more filter calls
#[derive(Clone, Debug, Default)]
pub struct Context {
    deadline: Option<Instant>,
    cancelled: Option<Arc<AtomicBool>>,
}

impl Context {
    /// No deadline, never cancelled
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Attach a cancellation flag and return the handle that trips it
    pub fn with_cancel(mut self) -> (Self, CancelHandle) {
        let flag = Arc::new(AtomicBool::new(false));
        self.cancelled = Some(flag.clone());
        (self, CancelHandle { flag })
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, `None` when there is no deadline
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }
}

/// Trips the cancellation flag of every clone of a [`Context`]
#[derive(Clone, Debug)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_background_never_expires() {
        let ctx = Context::background();
        assert!(!ctx.is_expired());
        assert!(!ctx.is_cancelled());
        assert_eq!(ctx.remaining(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_expires() {
        let ctx = Context::background().with_timeout(Duration::from_millis(50));
        assert!(!ctx.is_expired());

        tokio::time::advance(Duration::from_millis(60)).await;
        assert!(ctx.is_expired());
        assert_eq!(ctx.remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn test_cancel_reaches_clones() {
        let (ctx, handle) = Context::background().with_cancel();
        let clone = ctx.clone();

        handle.cancel();
        assert!(ctx.is_cancelled());
        assert!(clone.is_cancelled());
    }
}
