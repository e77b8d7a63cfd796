//! Ready-to-use policy recipes ("cookbook") for bulwark, plus the collaborators the demos
//! protect: a saturated network, an in-memory user directory, and a cancellable computation.
//!
//! **Recipes:**
//! - [`retry_policy`]: 3 attempts, 1s apart, retryable failures only
//! - [`circuit_breaker_policy`]: opens after 4 consecutive failures, probes after 5s
//! - [`unstable_network_policy`]: the breaker wrapped around the retry
//! - [`timeout_policy`]: 2s deadline, waits for the operation to unwind
//! - [`bulkhead_policy`]: 2 concurrent calls, 2 queued
//! - [`fallback_policy`]: substitutes a fixed value for any failure

use std::time::Duration;

use bulwark::bulkhead::BulkheadError;
use bulwark::circuit_breaker::CircuitBreakerError;
use bulwark::retry::BuildError;
use bulwark::timeout::TimeoutError;
use bulwark::{
    wrap, Backoff, BulkheadPolicy, CircuitBreakerPolicy, FallbackPolicy, RetryPolicy,
    TimeoutMode, TimeoutPolicy, Wrap,
};

pub mod bandwidth;
pub mod fibonacci;
pub mod users;

pub use bandwidth::BandwidthSimulator;
pub use fibonacci::fibonacci;
pub use users::{User, UserDirectory, UserService};

/// Errors from assembling a composite recipe.
#[derive(Debug, thiserror::Error)]
pub enum RecipeError {
    #[error(transparent)]
    Retry(#[from] BuildError),
    #[error(transparent)]
    CircuitBreaker(#[from] CircuitBreakerError),
}

/// Bounded retry: 3 attempts with a constant 1s backoff.
pub fn retry_policy() -> Result<RetryPolicy, BuildError> {
    RetryPolicy::builder()
        .max_attempts(3)
        .backoff(Backoff::constant(Duration::from_millis(1000)))
        .build()
}

/// Consecutive-failure breaker: threshold 4, half-open after 5s.
pub fn circuit_breaker_policy() -> Result<CircuitBreakerPolicy, CircuitBreakerError> {
    CircuitBreakerPolicy::new(4, Duration::from_millis(5000))
}

/// Breaker around retry: a whole failed retry sequence counts once toward the threshold.
pub fn unstable_network_policy() -> Result<Wrap<CircuitBreakerPolicy, RetryPolicy>, RecipeError> {
    Ok(wrap(circuit_breaker_policy()?, retry_policy()?))
}

/// 2s deadline, strict: the call returns once the operation has stopped.
pub fn timeout_policy() -> Result<TimeoutPolicy, TimeoutError> {
    Ok(TimeoutPolicy::new(Duration::from_millis(2000))?.with_mode(TimeoutMode::Strict))
}

/// 2 execution slots, 2 queue slots.
pub fn bulkhead_policy() -> Result<BulkheadPolicy, BulkheadError> {
    BulkheadPolicy::new(2, 2)
}

/// Handle every failure by logging it and returning `value`.
pub fn fallback_policy<T>(value: T) -> FallbackPolicy<T>
where
    T: Clone + Send + Sync + 'static,
{
    FallbackPolicy::recover(move |failure| {
        tracing::info!(error = %failure, "Falling back!");
        value.clone()
    })
}
