#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # Bulwark
//!
//! Composable fault-tolerance policies for async Rust: retry, circuit breaker, timeout with
//! cooperative cancellation, bulkhead, and fallback.
//!
//! ## Features
//!
//! - **Retry** with bounded attempts and backoff, honoring the `retryable` flag of each failure
//! - **Circuit breaker** with a consecutive-failure threshold and a single half-open probe
//! - **Timeout** that signals cooperative cancellation through an [`ExecutionContext`]
//! - **Bulkhead** bounding concurrent executions with a FIFO wait queue
//! - **Fallback** substituting a recovery value for selected failures
//! - **Explicit composition**: policies wrap one another with [`wrap`] and every chain is
//!   itself a [`Policy`]
//!
//! ## Quick Start
//!
//! ```rust
//! use bulwark::{wrap, Backoff, CircuitBreakerPolicy, ExecutionContext, Failure, Policy, RetryPolicy};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let retry = RetryPolicy::builder()
//!         .max_attempts(3)
//!         .backoff(Backoff::constant(Duration::from_millis(10)))
//!         .build()
//!         .unwrap();
//!     let breaker = CircuitBreakerPolicy::new(4, Duration::from_secs(5)).unwrap();
//!     let chain = wrap(breaker, retry);
//!
//!     let result = chain
//!         .execute(|_ctx| async { Ok::<_, Failure>("pong") }, ExecutionContext::new())
//!         .await;
//!     assert_eq!(result.unwrap(), "pong");
//! }
//! ```

pub mod backoff;
pub mod bulkhead;
pub mod circuit_breaker;
pub mod clock;
pub mod composer;
#[cfg(feature = "config")]
pub mod config;
pub mod context;
pub mod error;
pub mod fallback;
pub mod policy;
pub mod prelude;
pub mod retry;
pub mod service;
pub mod sleeper;
pub mod stack;
pub mod telemetry;
pub mod timeout;

// Re-exports
pub use backoff::Backoff;
pub use bulkhead::BulkheadPolicy;
pub use circuit_breaker::{CircuitBreakerConfig, CircuitBreakerPolicy, CircuitState};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use composer::{wrap, Passthrough, Wrap};
#[cfg(feature = "config")]
pub use config::{ConfigError, ResilienceSettings};
pub use context::ExecutionContext;
pub use error::{Failure, FailureKind};
pub use fallback::FallbackPolicy;
pub use policy::{Policy, PolicyExt};
pub use retry::{RetryPolicy, RetryPolicyBuilder};
pub use service::{PolicyLayer, PolicyService, Scoped};
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use stack::{ResilienceStack, ResilienceStackBuilder};
pub use timeout::{TimeoutMode, TimeoutPolicy};
