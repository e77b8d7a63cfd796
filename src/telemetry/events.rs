use crate::FailureKind;
use std::fmt;
use std::time::Duration;

/// Policy events emitted during execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyEvent {
    Retry(RetryEvent),
    CircuitBreaker(CircuitBreakerEvent),
    Bulkhead(BulkheadEvent),
    Timeout(TimeoutEvent),
    Fallback(FallbackEvent),
}

/// Events emitted by retry policies.
///
/// Exactly one terminal event (`Succeeded`, `Exhausted`, or `ShortCircuited`) is emitted per
/// `execute` call that ran at least one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryEvent {
    /// A retry is about to be made after `delay`.
    Attempt {
        /// The upcoming attempt number (1-indexed, so the first retry is attempt 2).
        attempt: usize,
        delay: Duration,
    },
    /// The operation succeeded after `attempts` invocations.
    Succeeded { attempts: usize },
    /// Every attempt failed with a retryable failure.
    Exhausted { attempts: usize },
    /// A non-retryable failure (or cancellation) ended the sequence early.
    ShortCircuited { attempts: usize },
}

/// Events emitted by circuit breaker policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitBreakerEvent {
    /// Closed or Half-Open → Open.
    Opened { failure_count: usize },
    /// Open → Half-Open; one probe call is admitted.
    HalfOpen,
    /// Half-Open → Closed after a successful probe.
    Closed,
    /// A call was short-circuited without reaching the operation.
    Rejected,
}

/// Events emitted by bulkhead policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkheadEvent {
    /// The caller got an execution slot.
    Acquired { in_flight: usize, max_concurrency: usize },
    /// The caller is waiting in the queue.
    Queued { queued: usize, max_queue: usize },
    /// No execution or queue slot was left.
    Rejected { in_flight: usize, queued: usize },
}

/// Events emitted by timeout policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutEvent {
    /// The deadline elapsed and the cancellation signal was set.
    Occurred { timeout: Duration },
}

/// Events emitted by fallback policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackEvent {
    /// A failure of `kind` was replaced by the recovery value.
    Recovered { kind: FailureKind },
}

impl fmt::Display for PolicyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyEvent::Retry(event) => write!(f, "Retry::{}", event),
            PolicyEvent::CircuitBreaker(event) => write!(f, "CircuitBreaker::{}", event),
            PolicyEvent::Bulkhead(event) => write!(f, "Bulkhead::{}", event),
            PolicyEvent::Timeout(event) => write!(f, "Timeout::{}", event),
            PolicyEvent::Fallback(event) => write!(f, "Fallback::{}", event),
        }
    }
}

impl fmt::Display for RetryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryEvent::Attempt { attempt, delay } => {
                write!(f, "Attempt(#{}, delay={:?})", attempt, delay)
            }
            RetryEvent::Succeeded { attempts } => write!(f, "Succeeded(attempts={})", attempts),
            RetryEvent::Exhausted { attempts } => write!(f, "Exhausted(attempts={})", attempts),
            RetryEvent::ShortCircuited { attempts } => {
                write!(f, "ShortCircuited(attempts={})", attempts)
            }
        }
    }
}

impl fmt::Display for CircuitBreakerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitBreakerEvent::Opened { failure_count } => {
                write!(f, "Opened(failures={})", failure_count)
            }
            CircuitBreakerEvent::HalfOpen => write!(f, "HalfOpen"),
            CircuitBreakerEvent::Closed => write!(f, "Closed"),
            CircuitBreakerEvent::Rejected => write!(f, "Rejected"),
        }
    }
}

impl fmt::Display for BulkheadEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BulkheadEvent::Acquired { in_flight, max_concurrency } => {
                write!(f, "Acquired({}/{})", in_flight, max_concurrency)
            }
            BulkheadEvent::Queued { queued, max_queue } => {
                write!(f, "Queued({}/{})", queued, max_queue)
            }
            BulkheadEvent::Rejected { in_flight, queued } => {
                write!(f, "Rejected(in_flight={}, queued={})", in_flight, queued)
            }
        }
    }
}

impl fmt::Display for TimeoutEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutEvent::Occurred { timeout } => write!(f, "Occurred(timeout={:?})", timeout),
        }
    }
}

impl fmt::Display for FallbackEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackEvent::Recovered { kind } => write!(f, "Recovered(kind={})", kind),
        }
    }
}
