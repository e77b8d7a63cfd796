//! Failure taxonomy shared by every policy.
//!
//! A [`Failure`] carries a [`FailureKind`], a human-readable message, and a `retryable` flag.
//! The flag is decided by the code that raises the failure; policies never infer it.
//!
//! Propagation rules:
//! - Retry only re-invokes on `retryable == true`.
//! - Circuit breakers observe failures but return them unchanged.
//! - Fallback converts a configured subset of failures into a substituted value.
//! - Everything else passes through to the next outer layer untouched.
use std::fmt;
use std::time::Duration;

/// Category of a [`Failure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Transient network failure.
    Network,
    /// A dependency ran out of capacity (bandwidth, storage, quota).
    ResourceExhausted,
    /// A deadline elapsed before the operation returned.
    Timeout,
    /// The operation observed the cancellation signal and gave up.
    Cancelled,
    /// A circuit breaker short-circuited the call.
    CircuitOpen,
    /// A bulkhead had no execution or queue slot left.
    BulkheadFull,
    /// The requested entity does not exist.
    NotFound,
    /// Any other domain error.
    Generic,
}

impl FailureKind {
    /// Whether failures of this kind are retryable unless the raiser says otherwise.
    pub fn retryable_by_default(self) -> bool {
        matches!(self, FailureKind::Network | FailureKind::ResourceExhausted)
    }

    /// HTTP-style status code the transport layer reports for this kind.
    pub fn status_code(self) -> u16 {
        match self {
            FailureKind::Network => 599,
            FailureKind::ResourceExhausted => 507,
            FailureKind::Timeout => 504,
            FailureKind::Cancelled => 499,
            FailureKind::CircuitOpen => 503,
            FailureKind::BulkheadFull => 429,
            FailureKind::NotFound => 404,
            FailureKind::Generic => 500,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Network => "network",
            FailureKind::ResourceExhausted => "resource exhausted",
            FailureKind::Timeout => "timeout",
            FailureKind::Cancelled => "cancelled",
            FailureKind::CircuitOpen => "circuit open",
            FailureKind::BulkheadFull => "bulkhead full",
            FailureKind::NotFound => "not found",
            FailureKind::Generic => "generic",
        };
        f.write_str(name)
    }
}

/// Typed failure returned by operations and policies.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} failure: {message}{}", exhausted_suffix(.exhausted_after))]
pub struct Failure {
    kind: FailureKind,
    message: String,
    retryable: bool,
    exhausted_after: Option<usize>,
}

fn exhausted_suffix(exhausted_after: &Option<usize>) -> String {
    match exhausted_after {
        Some(attempts) => format!(" (retry exhausted after {} attempts)", attempts),
        None => String::new(),
    }
}

impl Failure {
    /// Construct a failure with an explicit retryable flag.
    pub fn new(kind: FailureKind, message: impl Into<String>, retryable: bool) -> Self {
        Self { kind, message: message.into(), retryable, exhausted_after: None }
    }

    /// Construct a failure using the kind's default retryability.
    pub fn of_kind(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::new(kind, message, kind.retryable_by_default())
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::of_kind(FailureKind::Network, message)
    }

    pub fn resource_exhausted(message: impl Into<String>) -> Self {
        Self::of_kind(FailureKind::ResourceExhausted, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::of_kind(FailureKind::Cancelled, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::of_kind(FailureKind::NotFound, message)
    }

    pub fn generic(message: impl Into<String>) -> Self {
        Self::of_kind(FailureKind::Generic, message)
    }

    /// Failure raised by a timeout policy once its deadline elapsed.
    pub fn timeout(elapsed: Duration, limit: Duration) -> Self {
        Self::of_kind(
            FailureKind::Timeout,
            format!("operation timed out after {:?} (limit: {:?})", elapsed, limit),
        )
    }

    /// Failure raised by an open (or probing) circuit breaker.
    pub fn circuit_open(failure_count: usize, open_for: Duration) -> Self {
        Self::of_kind(
            FailureKind::CircuitOpen,
            format!("circuit breaker open ({} failures, open for {:?})", failure_count, open_for),
        )
    }

    /// Failure raised by a saturated bulkhead.
    pub fn bulkhead_full(in_flight: usize, queued: usize) -> Self {
        Self::of_kind(
            FailureKind::BulkheadFull,
            format!("bulkhead rejected request ({} in-flight, {} queued)", in_flight, queued),
        )
    }

    /// Override the retryable flag at construction time.
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Tag the failure as the last one of an exhausted retry sequence.
    pub fn exhausted(mut self, attempts: usize) -> Self {
        self.exhausted_after = Some(attempts);
        self
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// Number of attempts made if a retry policy gave up on this failure.
    pub fn exhausted_after(&self) -> Option<usize> {
        self.exhausted_after
    }

    pub fn is_retry_exhausted(&self) -> bool {
        self.exhausted_after.is_some()
    }

    /// True for both `Timeout` and `Cancelled`.
    pub fn is_cancellation(&self) -> bool {
        matches!(self.kind, FailureKind::Timeout | FailureKind::Cancelled)
    }

    pub fn is_circuit_open(&self) -> bool {
        self.kind == FailureKind::CircuitOpen
    }

    pub fn is_bulkhead_full(&self) -> bool {
        self.kind == FailureKind::BulkheadFull
    }

    pub fn status_code(&self) -> u16 {
        self.kind.status_code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_and_resource_failures_default_to_retryable() {
        assert!(Failure::network("flaky").is_retryable());
        assert!(Failure::resource_exhausted("full").is_retryable());
        assert!(!Failure::not_found("nobody").is_retryable());
        assert!(!Failure::generic("boom").is_retryable());
        assert!(!Failure::cancelled("stop").is_retryable());
        assert!(!Failure::circuit_open(4, Duration::from_secs(1)).is_retryable());
        assert!(!Failure::bulkhead_full(2, 2).is_retryable());
    }

    #[test]
    fn raiser_can_override_retryable_flag() {
        let failure = Failure::network("Timed out!").with_retryable(false);
        assert_eq!(failure.kind(), FailureKind::Network);
        assert!(!failure.is_retryable());
    }

    #[test]
    fn display_includes_kind_and_message() {
        let msg = Failure::network("Unstable network!").to_string();
        assert_eq!(msg, "network failure: Unstable network!");
    }

    #[test]
    fn exhausted_tag_shows_in_display() {
        let failure = Failure::network("down").exhausted(3);
        assert!(failure.is_retry_exhausted());
        assert_eq!(failure.exhausted_after(), Some(3));
        assert!(failure.to_string().contains("retry exhausted after 3 attempts"));
    }

    #[test]
    fn timeout_display_includes_durations() {
        let failure = Failure::timeout(Duration::from_millis(5100), Duration::from_secs(5));
        let msg = failure.to_string();
        assert!(msg.contains("timed out"));
        assert!(msg.contains("5.1"));
        assert!(failure.is_cancellation());
    }

    #[test]
    fn status_codes_follow_kind() {
        assert_eq!(Failure::network("x").status_code(), 599);
        assert_eq!(Failure::resource_exhausted("x").status_code(), 507);
        assert_eq!(Failure::not_found("x").status_code(), 404);
        assert_eq!(Failure::bulkhead_full(1, 0).status_code(), 429);
        assert_eq!(Failure::circuit_open(1, Duration::ZERO).status_code(), 503);
    }

    #[test]
    fn predicates_cover_kinds() {
        assert!(Failure::cancelled("x").is_cancellation());
        assert!(Failure::circuit_open(1, Duration::ZERO).is_circuit_open());
        assert!(Failure::bulkhead_full(1, 1).is_bulkhead_full());
        assert!(!Failure::generic("x").is_cancellation());
    }
}
