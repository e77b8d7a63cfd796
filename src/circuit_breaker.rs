//! Circuit breaker with a mutex-guarded state machine
//!
//! - **Closed**: calls pass through. Every counted failure bumps the consecutive-failure
//!   counter, every success resets it. Reaching `failure_threshold` opens the circuit.
//! - **Open**: calls are short-circuited with a `CircuitOpen` failure and never reach the
//!   operation. Once `half_open_after` has elapsed since opening, the next caller becomes the
//!   probe.
//! - **Half-Open**: exactly one probe runs. Success closes the circuit; failure re-opens it with
//!   a fresh timestamp. Callers arriving while the probe is in flight are short-circuited.
//!
//! An admitted call whose future is dropped before it finishes (an outer timeout in
//! abort-on-return mode, an aborted task) is recorded as a counted failure.
//!
//! All transitions happen under one lock per breaker; the lock is never held across an await.
//! Clones share state, so a breaker handed to several chains guards one dependency.

use crate::telemetry::{CircuitBreakerEvent, EventSink, PolicyEvent, TelemetrySink};
use crate::{Clock, ExecutionContext, Failure, MonotonicClock, Policy};
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Current state of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operating mode.
    Closed,
    /// Short-circuits calls until the half-open delay elapses.
    Open,
    /// A single probe call is testing recovery.
    HalfOpen,
}

/// Validated breaker configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    failure_threshold: usize,
    half_open_after: Duration,
}

/// Errors produced when validating breaker configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CircuitBreakerError {
    #[error("failure_threshold must be > 0 (got {provided})")]
    InvalidFailureThreshold { provided: usize },
    #[error("half_open_after must be > 0 (got {0:?})")]
    InvalidHalfOpenDelay(Duration),
}

impl CircuitBreakerConfig {
    pub fn new(
        failure_threshold: usize,
        half_open_after: Duration,
    ) -> Result<Self, CircuitBreakerError> {
        if failure_threshold == 0 {
            return Err(CircuitBreakerError::InvalidFailureThreshold { provided: failure_threshold });
        }
        if half_open_after.is_zero() {
            return Err(CircuitBreakerError::InvalidHalfOpenDelay(half_open_after));
        }
        Ok(Self { failure_threshold, half_open_after })
    }

    /// Consecutive failures that open the circuit.
    pub fn failure_threshold(&self) -> usize {
        self.failure_threshold
    }

    /// Time spent Open before a probe is admitted.
    pub fn half_open_after(&self) -> Duration {
        self.half_open_after
    }
}

impl Default for CircuitBreakerConfig {
    /// Threshold 4, half-open after 5 seconds.
    fn default() -> Self {
        Self { failure_threshold: 4, half_open_after: Duration::from_millis(5000) }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: usize,
    opened_at_millis: u64,
    probe_in_flight: bool,
}

impl BreakerState {
    fn open(&mut self, now: u64) {
        self.state = CircuitState::Open;
        self.opened_at_millis = now;
        self.probe_in_flight = false;
    }
}

type FailurePredicate = Arc<dyn Fn(&Failure) -> bool + Send + Sync>;

enum Admission {
    Call,
    Probe { transitioned: bool },
    Reject { failure_count: usize, open_for: Duration },
}

/// Circuit breaker policy guarding an async operation.
#[derive(Clone)]
pub struct CircuitBreakerPolicy {
    state: Arc<Mutex<BreakerState>>,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    counts_failure: Option<FailurePredicate>,
    sink: EventSink,
}

impl fmt::Debug for CircuitBreakerPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerPolicy")
            .field("state", &self.state())
            .field("failure_count", &self.failure_count())
            .field("config", &self.config)
            .field("filtered", &self.counts_failure.is_some())
            .finish()
    }
}

impl CircuitBreakerPolicy {
    /// Create a breaker, validating the threshold and delay.
    ///
    /// ```
    /// use bulwark::CircuitBreakerPolicy;
    /// use std::time::Duration;
    /// let breaker = CircuitBreakerPolicy::new(4, Duration::from_secs(5)).unwrap();
    /// assert!(CircuitBreakerPolicy::new(0, Duration::from_secs(5)).is_err());
    /// ```
    pub fn new(
        failure_threshold: usize,
        half_open_after: Duration,
    ) -> Result<Self, CircuitBreakerError> {
        CircuitBreakerConfig::new(failure_threshold, half_open_after).map(Self::with_config)
    }

    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                opened_at_millis: 0,
                probe_in_flight: false,
            })),
            config,
            clock: Arc::new(MonotonicClock::default()),
            counts_failure: None,
            sink: EventSink::disabled(),
        }
    }

    /// Override the clock (useful for deterministic tests).
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Only failures matching `predicate` count toward the threshold. Others pass through
    /// untouched and are treated as a healthy response from the dependency.
    pub fn count_failures_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Failure) -> bool + Send + Sync + 'static,
    {
        self.counts_failure = Some(Arc::new(predicate));
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

    pub fn config(&self) -> CircuitBreakerConfig {
        self.config
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Consecutive counted failures since the last success.
    pub fn failure_count(&self) -> usize {
        self.lock().failure_count
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn admit(&self) -> Admission {
        let now = self.clock.now_millis();
        let mut s = self.lock();
        let open_for = Duration::from_millis(now.saturating_sub(s.opened_at_millis));
        match s.state {
            CircuitState::Closed => Admission::Call,
            CircuitState::Open if open_for >= self.config.half_open_after => {
                s.state = CircuitState::HalfOpen;
                s.probe_in_flight = true;
                tracing::info!(?open_for, "circuit breaker half-open; admitting probe");
                Admission::Probe { transitioned: true }
            }
            CircuitState::HalfOpen if !s.probe_in_flight => {
                s.probe_in_flight = true;
                Admission::Probe { transitioned: false }
            }
            CircuitState::Open | CircuitState::HalfOpen => {
                Admission::Reject { failure_count: s.failure_count, open_for }
            }
        }
    }

    fn record_success(&self, probe: bool) -> Option<CircuitBreakerEvent> {
        let mut s = self.lock();
        if probe {
            s.state = CircuitState::Closed;
            s.failure_count = 0;
            s.probe_in_flight = false;
            tracing::info!("circuit breaker closed after successful probe");
            return Some(CircuitBreakerEvent::Closed);
        }
        // A late result from a call admitted before the circuit opened must not close it.
        if s.state == CircuitState::Closed {
            s.failure_count = 0;
        }
        None
    }

    fn record_failure(&self, probe: bool, failure: &Failure) -> Option<CircuitBreakerEvent> {
        if let Some(counts) = &self.counts_failure {
            if !counts(failure) {
                return self.record_success(probe);
            }
        }
        self.count_failure(probe, failure)
    }

    fn count_failure(&self, probe: bool, cause: &dyn fmt::Display) -> Option<CircuitBreakerEvent> {
        let now = self.clock.now_millis();
        let mut s = self.lock();
        if probe {
            s.failure_count = s.failure_count.saturating_add(1);
            s.open(now);
            tracing::warn!(error = %cause, "circuit breaker probe failed; re-opening");
            return Some(CircuitBreakerEvent::Opened { failure_count: s.failure_count });
        }
        if s.state != CircuitState::Closed {
            return None;
        }
        s.failure_count = s.failure_count.saturating_add(1);
        if s.failure_count >= self.config.failure_threshold {
            s.open(now);
            tracing::error!(
                failure_count = s.failure_count,
                threshold = self.config.failure_threshold,
                "circuit breaker opened"
            );
            return Some(CircuitBreakerEvent::Opened { failure_count: s.failure_count });
        }
        None
    }
}

impl Default for CircuitBreakerPolicy {
    fn default() -> Self {
        Self::with_config(CircuitBreakerConfig::default())
    }
}

/// Admitted call in flight. Dropping it before the outcome is recorded (an outer timeout
/// aborting the call, a cancelled task) counts as a failure: a call bumps the counter and a
/// probe re-opens the circuit.
struct InFlight<'a> {
    breaker: &'a CircuitBreakerPolicy,
    probe: bool,
    armed: bool,
}

impl InFlight<'_> {
    fn complete(mut self) {
        self.armed = false;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some(event) = self.breaker.count_failure(self.probe, &"call dropped before completing")
        {
            tracing::debug!(%event, "circuit breaker transition from abandoned call");
        }
    }
}

#[async_trait]
impl<T> Policy<T> for CircuitBreakerPolicy
where
    T: Send + 'static,
{
    async fn execute<Op, Fut>(&self, operation: Op, ctx: ExecutionContext) -> Result<T, Failure>
    where
        Op: Fn(ExecutionContext) -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, Failure>> + Send,
    {
        let (probe, transitioned) = match self.admit() {
            Admission::Call => (false, false),
            Admission::Probe { transitioned } => (true, transitioned),
            Admission::Reject { failure_count, open_for } => {
                tracing::debug!(failure_count, ?open_for, "circuit breaker rejected call");
                self.sink.emit(PolicyEvent::CircuitBreaker(CircuitBreakerEvent::Rejected)).await;
                return Err(Failure::circuit_open(failure_count, open_for));
            }
        };

        let in_flight = InFlight { breaker: self, probe, armed: true };
        if transitioned {
            self.sink.emit(PolicyEvent::CircuitBreaker(CircuitBreakerEvent::HalfOpen)).await;
        }
        let result = operation(ctx).await;
        in_flight.complete();

        let transition = match &result {
            Ok(_) => self.record_success(probe),
            Err(failure) => self.record_failure(probe, failure),
        };
        if let Some(event) = transition {
            self.sink.emit(PolicyEvent::CircuitBreaker(event)).await;
        }
        result
    }
}
