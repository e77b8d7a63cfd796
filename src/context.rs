//! Per-invocation cancellation context.
//!
//! An [`ExecutionContext`] is a cheap handle: clones share the same signal, so every nested
//! sub-call observes the cancellation set by whoever created the context. Timeout policies
//! derive a child context with a deadline; cancelling a parent cancels all of its children,
//! never the reverse. Once set, the signal stays set.
//!
//! Cancellation is cooperative. Operations poll [`ExecutionContext::check`] at meaningful
//! checkpoints, or race their work against [`ExecutionContext::cancelled`].
//!
//! ```rust
//! use bulwark::{ExecutionContext, Failure};
//!
//! fn step(ctx: &ExecutionContext, n: u64) -> Result<u64, Failure> {
//!     ctx.check()?;
//!     Ok(n * 2)
//! }
//!
//! let ctx = ExecutionContext::new();
//! assert_eq!(step(&ctx, 21).unwrap(), 42);
//! ctx.cancel();
//! assert!(step(&ctx, 21).unwrap_err().is_cancellation());
//! ```

use crate::Failure;
use pin_project::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Shared cancellation signal plus an optional deadline.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    inner: Arc<ContextInner>,
}

#[derive(Debug)]
struct ContextInner {
    token: CancellationToken,
    cancelled_at: OnceLock<Instant>,
    deadline: Option<Instant>,
    parent: Option<ExecutionContext>,
}

impl ExecutionContext {
    /// Root context without a deadline. It is only cancelled by an explicit [`cancel`](Self::cancel).
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ContextInner {
                token: CancellationToken::new(),
                cancelled_at: OnceLock::new(),
                deadline: None,
                parent: None,
            }),
        }
    }

    /// Linked child context without its own deadline.
    pub fn child(&self) -> Self {
        self.derive(self.inner.deadline)
    }

    /// Linked child context whose deadline is the earlier of `deadline` and the parent's.
    pub fn child_with_deadline(&self, deadline: Instant) -> Self {
        let effective = match self.inner.deadline {
            Some(parent) => parent.min(deadline),
            None => deadline,
        };
        self.derive(Some(effective))
    }

    fn derive(&self, deadline: Option<Instant>) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                token: self.inner.token.child_token(),
                cancelled_at: OnceLock::new(),
                deadline,
                parent: Some(self.clone()),
            }),
        }
    }

    /// Set the signal. Idempotent; the first call records the timestamp.
    pub fn cancel(&self) {
        let _ = self.inner.cancelled_at.set(Instant::now());
        self.inner.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// When the signal was set, on this context or the ancestor that propagated it.
    pub fn cancelled_at(&self) -> Option<Instant> {
        if !self.is_cancelled() {
            return None;
        }
        self.inner
            .cancelled_at
            .get()
            .copied()
            .or_else(|| self.inner.parent.as_ref().and_then(|p| p.cancelled_at()))
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Time left until the deadline, saturating at zero. `None` when there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.inner.deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Checkpoint for cooperative cancellation.
    pub fn check(&self) -> Result<(), Failure> {
        if self.is_cancelled() {
            Err(Failure::cancelled("task was cancelled"))
        } else {
            Ok(())
        }
    }

    /// Resolves once the signal is set.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.inner.token.cancelled()
    }

    /// Race `future` against the signal; a set signal wins and yields a `Cancelled` failure.
    pub fn run_until_cancelled<T, F>(&self, future: F) -> UntilCancelled<'_, F>
    where
        F: Future<Output = Result<T, Failure>>,
    {
        UntilCancelled { future, cancelled: self.inner.token.cancelled() }
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Future returned by [`ExecutionContext::run_until_cancelled`].
#[pin_project]
#[must_use = "futures do nothing unless polled"]
pub struct UntilCancelled<'a, F> {
    #[pin]
    future: F,
    #[pin]
    cancelled: WaitForCancellationFuture<'a>,
}

impl<'a, T, F> Future for UntilCancelled<'a, F>
where
    F: Future<Output = Result<T, Failure>>,
{
    type Output = Result<T, Failure>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        if this.cancelled.poll(cx).is_ready() {
            return Poll::Ready(Err(Failure::cancelled("task was cancelled")));
        }
        this.future.poll(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FailureKind;

    #[test]
    fn root_context_starts_uncancelled() {
        let ctx = ExecutionContext::new();
        assert!(!ctx.is_cancelled());
        assert!(ctx.cancelled_at().is_none());
        assert!(ctx.deadline().is_none());
        assert!(ctx.remaining().is_none());
        assert!(ctx.check().is_ok());
    }

    #[test]
    fn clones_share_the_signal() {
        let ctx = ExecutionContext::new();
        let seen_by_subcall = ctx.clone();
        ctx.cancel();
        assert!(seen_by_subcall.is_cancelled());
        assert_eq!(seen_by_subcall.check().unwrap_err().kind(), FailureKind::Cancelled);
    }

    #[test]
    fn cancel_is_sticky_and_keeps_first_timestamp() {
        let ctx = ExecutionContext::new();
        ctx.cancel();
        let first = ctx.cancelled_at().unwrap();
        ctx.cancel();
        assert_eq!(ctx.cancelled_at(), Some(first));
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn parent_cancellation_reaches_children_but_not_back() {
        let parent = ExecutionContext::new();
        let child = parent.child();
        let grandchild = child.child();

        grandchild.cancel();
        assert!(!parent.is_cancelled());
        assert!(!child.is_cancelled());

        parent.cancel();
        assert!(child.is_cancelled());
        assert_eq!(child.cancelled_at(), parent.cancelled_at());
    }

    #[tokio::test]
    async fn child_deadline_never_exceeds_parent() {
        let now = Instant::now();
        let parent = ExecutionContext::new().child_with_deadline(now + Duration::from_millis(50));
        let child = parent.child_with_deadline(now + Duration::from_secs(10));
        assert_eq!(child.deadline(), parent.deadline());

        let tighter = parent.child_with_deadline(now + Duration::from_millis(10));
        assert_eq!(tighter.deadline(), Some(now + Duration::from_millis(10)));
        assert!(tighter.remaining().unwrap() <= Duration::from_millis(10));
    }

    #[tokio::test]
    async fn cancelled_future_resolves_after_cancel() {
        let ctx = ExecutionContext::new();
        let waiter = ctx.clone();
        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
            true
        });
        tokio::task::yield_now().await;
        ctx.cancel();
        assert!(handle.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn run_until_cancelled_prefers_signal() {
        let ctx = ExecutionContext::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let result = ctx
            .run_until_cancelled(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, Failure>(1)
            })
            .await;
        assert_eq!(result.unwrap_err().kind(), FailureKind::Cancelled);
    }

    #[tokio::test]
    async fn run_until_cancelled_passes_through_result() {
        let ctx = ExecutionContext::new();
        let result = ctx.run_until_cancelled(async { Ok::<_, Failure>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
