//! Convenient re-exports for common bulwark types.
pub use crate::{
    backoff::{Backoff, BackoffError, MAX_BACKOFF},
    bulkhead::{BulkheadError, BulkheadPolicy},
    circuit_breaker::{CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerPolicy, CircuitState},
    composer::{wrap, Passthrough, Wrap},
    context::ExecutionContext,
    error::{Failure, FailureKind},
    fallback::FallbackPolicy,
    policy::{Policy, PolicyExt},
    retry::{BuildError, RetryPolicy, RetryPolicyBuilder},
    stack::ResilienceStack,
    timeout::{TimeoutError, TimeoutMode, TimeoutPolicy},
};
