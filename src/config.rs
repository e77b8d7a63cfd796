//! Literal policy configuration.
//!
//! Every knob is a plain number (attempts, slots, thresholds, milliseconds). Missing fields take
//! the documented defaults; a layer set to `null` is left out of the stack.
//!
//! ```rust
//! use bulwark::ResilienceSettings;
//!
//! let settings = ResilienceSettings::from_json_str(
//!     r#"{ "retry": { "max_attempts": 5 }, "bulkhead": null }"#,
//! )
//! .unwrap();
//! let stack = settings.build().unwrap();
//! assert_eq!(stack.retry().map(|r| r.max_attempts()), Some(5));
//! assert!(stack.bulkhead().is_none());
//! ```

use crate::bulkhead::BulkheadError;
use crate::circuit_breaker::CircuitBreakerError;
use crate::retry::BuildError;
use crate::timeout::TimeoutError;
use crate::{
    Backoff, BulkheadPolicy, CircuitBreakerPolicy, ResilienceStack, RetryPolicy, TimeoutMode,
    TimeoutPolicy,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid settings document: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("retry: {0}")]
    Retry(#[from] BuildError),
    #[error("circuit breaker: {0}")]
    CircuitBreaker(#[from] CircuitBreakerError),
    #[error("timeout: {0}")]
    Timeout(#[from] TimeoutError),
    #[error("bulkhead: {0}")]
    Bulkhead(#[from] BulkheadError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    pub max_attempts: usize,
    pub backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self { max_attempts: 3, backoff_ms: 1000 }
    }
}

impl RetrySettings {
    pub fn build(&self) -> Result<RetryPolicy, ConfigError> {
        Ok(RetryPolicy::builder()
            .max_attempts(self.max_attempts)
            .backoff(Backoff::constant(Duration::from_millis(self.backoff_ms)))
            .build()?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: usize,
    pub half_open_after_ms: u64,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self { failure_threshold: 4, half_open_after_ms: 5000 }
    }
}

impl CircuitBreakerSettings {
    pub fn build(&self) -> Result<CircuitBreakerPolicy, ConfigError> {
        Ok(CircuitBreakerPolicy::new(
            self.failure_threshold,
            Duration::from_millis(self.half_open_after_ms),
        )?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimeoutSettings {
    pub timeout_ms: u64,
    /// Return a `Timeout` failure at the deadline and drop the operation instead of waiting
    /// for it to unwind.
    pub abort_on_return: bool,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self { timeout_ms: 2000, abort_on_return: false }
    }
}

impl TimeoutSettings {
    pub fn build(&self) -> Result<TimeoutPolicy, ConfigError> {
        let mode = if self.abort_on_return { TimeoutMode::AbortOnReturn } else { TimeoutMode::Strict };
        Ok(TimeoutPolicy::new(Duration::from_millis(self.timeout_ms))?.with_mode(mode))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BulkheadSettings {
    pub max_concurrency: usize,
    pub max_queue: usize,
}

impl Default for BulkheadSettings {
    fn default() -> Self {
        Self { max_concurrency: 2, max_queue: 2 }
    }
}

impl BulkheadSettings {
    pub fn build(&self) -> Result<BulkheadPolicy, ConfigError> {
        Ok(BulkheadPolicy::new(self.max_concurrency, self.max_queue)?)
    }
}

/// Settings for a full [`ResilienceStack`], assembled outermost first as
/// Bulkhead → CircuitBreaker → Timeout → Retry. The timeout defaults to strict mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResilienceSettings {
    pub retry: Option<RetrySettings>,
    pub circuit_breaker: Option<CircuitBreakerSettings>,
    pub timeout: Option<TimeoutSettings>,
    pub bulkhead: Option<BulkheadSettings>,
}

impl Default for ResilienceSettings {
    fn default() -> Self {
        Self {
            retry: Some(RetrySettings::default()),
            circuit_breaker: Some(CircuitBreakerSettings::default()),
            timeout: Some(TimeoutSettings::default()),
            bulkhead: Some(BulkheadSettings::default()),
        }
    }
}

impl ResilienceSettings {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Build the stack, validating every configured layer.
    pub fn build(&self) -> Result<ResilienceStack, ConfigError> {
        let mut builder = ResilienceStack::builder();
        if let Some(bulkhead) = &self.bulkhead {
            builder = builder.bulkhead(bulkhead.build()?);
        }
        if let Some(timeout) = &self.timeout {
            builder = builder.timeout(timeout.build()?);
        }
        if let Some(breaker) = &self.circuit_breaker {
            builder = builder.circuit_breaker(breaker.build()?);
        }
        if let Some(retry) = &self.retry {
            builder = builder.retry(retry.build()?);
        }
        Ok(builder.build())
    }
}
