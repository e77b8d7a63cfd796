//! Retry policy implementation
//!
//! Semantics:
//! - `max_attempts` counts total attempts (initial try + retries); defaults to 3.
//! - Only failures raised with `retryable == true` are re-invoked; anything else returns
//!   immediately after the attempt that produced it.
//! - Between attempts the policy waits `backoff.delay(attempt)` (constant 1s by default) through
//!   its [`Sleeper`]. A cancellation signal observed during that wait ends the sequence with a
//!   `Cancelled` failure; without an enclosing timeout there is no cumulative deadline.
//! - When every attempt failed, the last failure is returned tagged with
//!   [`Failure::exhausted`].
//!
//! Invariants:
//! - Attempts never exceed `max_attempts`.
//! - The sleeper is invoked at most `max_attempts - 1` times.
//! - Exactly one terminal [`RetryEvent`] is emitted per call.
//!
//! ```rust
//! use bulwark::{Backoff, Failure, InstantSleeper, PolicyExt, RetryPolicy};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let policy = RetryPolicy::builder()
//!     .max_attempts(3)
//!     .backoff(Backoff::constant(Duration::from_millis(100)))
//!     .with_sleeper(InstantSleeper)
//!     .build()
//!     .unwrap();
//! let calls = Arc::new(AtomicUsize::new(0));
//! let counter = calls.clone();
//! let result = policy
//!     .run(move |_ctx| {
//!         let counter = counter.clone();
//!         async move {
//!             counter.fetch_add(1, Ordering::SeqCst);
//!             Err::<(), _>(Failure::network("Unstable network!"))
//!         }
//!     })
//!     .await;
//! assert_eq!(result.unwrap_err().exhausted_after(), Some(3));
//! assert_eq!(calls.load(Ordering::SeqCst), 3);
//! # });
//! ```

use crate::telemetry::{EventSink, PolicyEvent, RetryEvent, TelemetrySink};
use crate::{Backoff, ExecutionContext, Failure, Policy, Sleeper, TokioSleeper};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

/// Bounded retry with backoff between attempts.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: usize,
    backoff: Backoff,
    sleeper: Arc<dyn Sleeper>,
    sink: EventSink,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .field("sleeper", &self.sleeper)
            .field("sink", &self.sink)
            .finish()
    }
}

impl RetryPolicy {
    /// Construct a new builder with defaults (3 attempts, constant 1s backoff).
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::new()
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    async fn emit(&self, event: RetryEvent) {
        self.sink.emit(PolicyEvent::Retry(event)).await;
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::default(),
            sleeper: Arc::new(TokioSleeper),
            sink: EventSink::disabled(),
        }
    }
}

#[async_trait]
impl<T> Policy<T> for RetryPolicy
where
    T: Send + 'static,
{
    async fn execute<Op, Fut>(&self, operation: Op, ctx: ExecutionContext) -> Result<T, Failure>
    where
        Op: Fn(ExecutionContext) -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, Failure>> + Send,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let failure = match operation(ctx.clone()).await {
                Ok(value) => {
                    self.emit(RetryEvent::Succeeded { attempts: attempt }).await;
                    return Ok(value);
                }
                Err(failure) => failure,
            };

            if !failure.is_retryable() {
                tracing::debug!(attempt, error = %failure, "retry: non-retryable failure");
                self.emit(RetryEvent::ShortCircuited { attempts: attempt }).await;
                return Err(failure);
            }

            if attempt >= self.max_attempts {
                tracing::warn!(attempts = attempt, error = %failure, "retry exhausted");
                self.emit(RetryEvent::Exhausted { attempts: attempt }).await;
                return Err(failure.exhausted(attempt));
            }

            let delay = self.backoff.delay(attempt);
            tracing::debug!(attempt, ?delay, error = %failure, "retry: backing off");
            self.emit(RetryEvent::Attempt { attempt: attempt + 1, delay }).await;

            let cancelled = tokio::select! {
                biased;
                _ = ctx.cancelled() => true,
                _ = self.sleeper.sleep(delay) => ctx.is_cancelled(),
            };
            if cancelled {
                self.emit(RetryEvent::ShortCircuited { attempts: attempt }).await;
                return Err(Failure::cancelled(format!(
                    "retry cancelled after {} attempts; last error: {}",
                    attempt, failure
                )));
            }
        }
    }
}

/// Builder for `RetryPolicy`.
#[derive(Debug)]
pub struct RetryPolicyBuilder {
    policy: RetryPolicy,
}

/// Errors produced while building a retry policy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("max_attempts must be > 0 (got {0})")]
    InvalidMaxAttempts(usize),
}

impl RetryPolicyBuilder {
    pub fn new() -> Self {
        Self { policy: RetryPolicy::default() }
    }

    /// Set total attempts (initial + retries). Must be > 0.
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.policy.max_attempts = attempts;
        self
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.policy.backoff = backoff;
        self
    }

    /// Provide a custom sleeper implementation.
    pub fn with_sleeper<S>(mut self, sleeper: S) -> Self
    where
        S: Sleeper + 'static,
    {
        self.policy.sleeper = Arc::new(sleeper);
        self
    }

    pub fn with_sink<S>(mut self, sink: S) -> Self
    where
        S: TelemetrySink,
        S::Future: Send + 'static,
    {
        self.policy.sink = EventSink::new(sink);
        self
    }

    /// Build the retry policy, validating inputs.
    pub fn build(self) -> Result<RetryPolicy, BuildError> {
        if self.policy.max_attempts == 0 {
            return Err(BuildError::InvalidMaxAttempts(0));
        }
        Ok(self.policy)
    }
}

impl Default for RetryPolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}
