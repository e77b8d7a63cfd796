//! Timeout policy with cooperative cancellation
//!
//! Each call derives a child [`ExecutionContext`] whose deadline is `now + duration` and hands it
//! to the operation. When the deadline elapses the child's signal is set; the operation and its
//! nested sub-calls are expected to notice at their checkpoints and give up with a `Cancelled`
//! failure. Nothing is interrupted preemptively.
//!
//! What the caller gets back depends on [`TimeoutMode`]:
//! - [`TimeoutMode::Strict`] (default): the policy keeps awaiting the operation, so when the
//!   call returns the operation has really stopped. A cooperative operation comes back with a
//!   `Cancelled` failure shortly after the deadline; one that never checks the signal runs to
//!   completion and its own result is returned.
//! - [`TimeoutMode::AbortOnReturn`]: a `Timeout` failure is returned right at the deadline and
//!   the in-flight future is dropped at its current suspension point. This stops the operation
//!   at its next `.await` whether or not it checks the signal; only work it spawned elsewhere
//!   keeps running until it observes the signal. Use it when the caller must not wait and the
//!   operation is safe to abandon mid-way.

use crate::telemetry::{EventSink, PolicyEvent, TelemetrySink, TimeoutEvent};
use crate::{ExecutionContext, Failure, Policy};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// How the policy returns once its deadline elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeoutMode {
    /// Signal cancellation and wait for the operation to unwind.
    #[default]
    Strict,
    /// Signal cancellation, drop the in-flight future and return a `Timeout` failure.
    AbortOnReturn,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimeoutError {
    #[error("timeout duration must be non-zero (got {0:?})")]
    InvalidDuration(Duration),
}

#[derive(Debug, Clone)]
pub struct TimeoutPolicy {
    duration: Duration,
    mode: TimeoutMode,
    sink: EventSink,
}

impl TimeoutPolicy {
    /// Create a timeout policy; zero durations are rejected.
    pub fn new(duration: Duration) -> Result<Self, TimeoutError> {
        if duration.is_zero() {
            return Err(TimeoutError::InvalidDuration(duration));
        }
        Ok(Self { duration, mode: TimeoutMode::default(), sink: EventSink::disabled() })
    }

    pub fn with_mode(mut self, mode: TimeoutMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_sink<S>(mut self, sink: S) -> Self
    where
        S: TelemetrySink,
        S::Future: Send + 'static,
    {
        self.sink = EventSink::new(sink);
        self
    }

    /// Inspect the configured timeout duration.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn mode(&self) -> TimeoutMode {
        self.mode
    }
}

impl Default for TimeoutPolicy {
    /// Two-second deadline, strict.
    fn default() -> Self {
        Self {
            duration: Duration::from_millis(2000),
            mode: TimeoutMode::Strict,
            sink: EventSink::disabled(),
        }
    }
}

#[async_trait]
impl<T> Policy<T> for TimeoutPolicy
where
    T: Send + 'static,
{
    async fn execute<Op, Fut>(&self, operation: Op, ctx: ExecutionContext) -> Result<T, Failure>
    where
        Op: Fn(ExecutionContext) -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, Failure>> + Send,
    {
        let start = Instant::now();
        // Durations too large to represent as an instant never elapse.
        let Some(deadline) = start.checked_add(self.duration) else {
            return operation(ctx.child()).await;
        };
        let scoped = ctx.child_with_deadline(deadline);

        let in_flight = operation(scoped.clone());
        tokio::pin!(in_flight);

        tokio::select! {
            biased;
            result = &mut in_flight => return result,
            _ = tokio::time::sleep_until(deadline) => {}
        }

        scoped.cancel();
        let elapsed = start.elapsed();
        tracing::warn!(?elapsed, timeout = ?self.duration, mode = ?self.mode, "operation timed out");
        self.sink.emit(PolicyEvent::Timeout(TimeoutEvent::Occurred { timeout: self.duration })).await;

        match self.mode {
            TimeoutMode::AbortOnReturn => Err(Failure::timeout(elapsed, self.duration)),
            TimeoutMode::Strict => in_flight.await,
        }
    }
}
