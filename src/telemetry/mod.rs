//! Telemetry and observability for bulwark policies.
//!
//! Every policy emits structured [`PolicyEvent`]s to an [`EventSink`] configured with
//! `with_sink(..)`. Sinks are `tower::Service<PolicyEvent>` implementations, so they compose
//! with standard tower combinators. Emission is best-effort and never fails a call.
//!
//! - **Retry**: `Attempt`, `Succeeded`, `Exhausted`, `ShortCircuited`
//! - **Circuit breaker**: `Opened`, `HalfOpen`, `Closed`, `Rejected`
//! - **Bulkhead**: `Acquired`, `Queued`, `Rejected`
//! - **Timeout**: `Occurred`
//! - **Fallback**: `Recovered`

pub mod events;
pub mod sinks;

pub use events::{
    BulkheadEvent, CircuitBreakerEvent, FallbackEvent, PolicyEvent, RetryEvent, TimeoutEvent,
};
pub use sinks::{emit_best_effort, EventSink, LogSink, MemorySink, NullSink, TelemetrySink};
