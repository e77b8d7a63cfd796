//! Delay schedules between retry attempts.
//!
//! Attempt `0` is the initial call and never waits; retries start at attempt `1`. The retry
//! policy defaults to a constant one-second delay. Linear and exponential schedules accept an
//! optional cap, and every schedule saturates at [`MAX_BACKOFF`] instead of overflowing.
//!
//! ```rust
//! use bulwark::Backoff;
//! use std::time::Duration;
//!
//! let fixed = Backoff::constant(Duration::from_secs(1));
//! assert_eq!(fixed.delay(0), Duration::ZERO);
//! assert_eq!(fixed.delay(3), Duration::from_secs(1));
//!
//! let capped = Backoff::exponential(Duration::from_millis(100))
//!     .with_max(Duration::from_millis(300))
//!     .unwrap();
//! assert_eq!(capped.delay(2), Duration::from_millis(200));
//! assert_eq!(capped.delay(5), Duration::from_millis(300));
//! ```

use std::time::Duration;

/// Upper bound used when a computed delay would overflow (1 day).
pub const MAX_BACKOFF: Duration = Duration::from_secs(24 * 60 * 60);

/// Errors returned by backoff configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackoffError {
    #[error("with_max is only valid for linear or exponential backoff")]
    ConstantDoesNotSupportMax,
    #[error("max must be greater than zero")]
    MaxMustBePositive,
    #[error("max ({max:?}) must be >= base ({base:?})")]
    MaxLessThanBase { base: Duration, max: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Schedule {
    Constant,
    Linear,
    Exponential,
}

/// Backoff schedule used by [`RetryPolicy`](crate::RetryPolicy).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    schedule: Schedule,
    base: Duration,
    max: Option<Duration>,
}

impl Backoff {
    /// Same delay before every retry.
    pub fn constant(delay: Duration) -> Self {
        Self { schedule: Schedule::Constant, base: delay, max: None }
    }

    /// `base * attempt`.
    pub fn linear(base: Duration) -> Self {
        Self { schedule: Schedule::Linear, base, max: None }
    }

    /// `base * 2^(attempt - 1)`.
    pub fn exponential(base: Duration) -> Self {
        Self { schedule: Schedule::Exponential, base, max: None }
    }

    /// Cap a growing schedule. Rejected for constant backoff, zero caps, and caps below `base`.
    pub fn with_max(mut self, max: Duration) -> Result<Self, BackoffError> {
        if self.schedule == Schedule::Constant {
            return Err(BackoffError::ConstantDoesNotSupportMax);
        }
        if max.is_zero() {
            return Err(BackoffError::MaxMustBePositive);
        }
        if max < self.base {
            return Err(BackoffError::MaxLessThanBase { base: self.base, max });
        }
        self.max = Some(max);
        Ok(self)
    }

    /// Delay before `attempt` (0-based; 0 = initial call, no delay).
    pub fn delay(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let raw = match self.schedule {
            Schedule::Constant => self.base,
            Schedule::Linear => {
                let factor = attempt.min(u32::MAX as usize) as u32;
                self.base.checked_mul(factor).unwrap_or(MAX_BACKOFF)
            }
            Schedule::Exponential => {
                let exponent = attempt.saturating_sub(1).min(u32::MAX as usize) as u32;
                let nanos = self.base.as_nanos().saturating_mul(2u128.saturating_pow(exponent));
                Duration::from_nanos(nanos.min(MAX_BACKOFF.as_nanos()) as u64)
            }
        };
        let capped = self.max.map_or(raw, |m| raw.min(m));
        capped.min(MAX_BACKOFF)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::constant(Duration::from_secs(1))
    }
}
