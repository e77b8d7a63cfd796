use super::events::PolicyEvent;
use std::convert::Infallible;
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use tower::util::BoxCloneService;
use tower::{BoxError, Service, ServiceExt};

type SinkFuture<E> = Pin<Box<dyn std::future::Future<Output = Result<(), E>> + Send>>;

/// A telemetry sink that consumes policy events.
pub trait TelemetrySink:
    tower::Service<PolicyEvent, Response = (), Error = Self::SinkError> + Clone + Send + 'static
{
    /// The error type for this sink.
    type SinkError: std::error::Error + Send + Sync + 'static;
}

/// Best-effort emit helper that honors `poll_ready` and swallows errors.
///
/// Telemetry never fails a policy call: a sink that is not ready or errors drops the event.
pub async fn emit_best_effort<S>(sink: S, event: PolicyEvent)
where
    S: tower::Service<PolicyEvent, Response = ()> + Send + 'static,
    S::Error: Send + 'static,
    S::Future: Send + 'static,
{
    if let Ok(mut ready_sink) = sink.ready_oneshot().await {
        let _ = ready_sink.call(event).await;
    }
}

/// Type-erased sink handle stored inside policies.
///
/// The default handle is disabled and costs nothing per event.
#[derive(Clone, Default)]
pub struct EventSink {
    service: Option<Arc<Mutex<BoxCloneService<PolicyEvent, (), BoxError>>>>,
}

impl EventSink {
    pub fn new<S>(sink: S) -> Self
    where
        S: TelemetrySink,
        S::Future: Send + 'static,
    {
        let boxed = BoxCloneService::new(sink.map_err(|e: S::SinkError| -> BoxError { Box::new(e) }));
        Self { service: Some(Arc::new(Mutex::new(boxed))) }
    }

    /// Handle that discards every event.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.service.is_some()
    }

    pub async fn emit(&self, event: PolicyEvent) {
        let Some(shared) = &self.service else {
            return;
        };
        let service = lock(shared).clone();
        emit_best_effort(service, event).await;
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink").field("enabled", &self.is_enabled()).finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A no-op telemetry sink that discards all events.
#[derive(Clone, Debug, Default)]
pub struct NullSink;

impl Service<PolicyEvent> for NullSink {
    type Response = ();
    type Error = Infallible;
    type Future = SinkFuture<Infallible>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _event: PolicyEvent) -> Self::Future {
        Box::pin(async { Ok(()) })
    }
}

impl TelemetrySink for NullSink {
    type SinkError = Infallible;
}

/// A telemetry sink that logs events using the `tracing` crate.
#[derive(Clone, Debug, Default)]
pub struct LogSink;

impl Service<PolicyEvent> for LogSink {
    type Response = ();
    type Error = Infallible;
    type Future = SinkFuture<Infallible>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: PolicyEvent) -> Self::Future {
        tracing::info!(event = %event, "policy_event");
        Box::pin(async { Ok(()) })
    }
}

impl TelemetrySink for LogSink {
    type SinkError = Infallible;
}

/// A bounded in-memory sink; the oldest event is evicted once full. Clones share storage.
#[derive(Clone, Debug)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<PolicyEvent>>>,
    capacity: usize,
    evicted: Arc<AtomicU64>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            capacity: capacity.max(1),
            evicted: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn events(&self) -> Vec<PolicyEvent> {
        lock(&self.events).clone()
    }

    pub fn clear(&self) {
        lock(&self.events).clear();
    }

    pub fn len(&self) -> usize {
        lock(&self.events).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.events).is_empty()
    }

    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<PolicyEvent> for MemorySink {
    type Response = ();
    type Error = Infallible;
    type Future = SinkFuture<Infallible>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: PolicyEvent) -> Self::Future {
        let mut guard = lock(&self.events);
        if guard.len() >= self.capacity {
            guard.remove(0);
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }
        guard.push(event);
        Box::pin(async { Ok(()) })
    }
}

impl TelemetrySink for MemorySink {
    type SinkError = Infallible;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::events::{CircuitBreakerEvent, RetryEvent, TimeoutEvent};
    use std::time::Duration;

    #[tokio::test]
    async fn memory_sink_evicts_oldest() {
        let mut sink = MemorySink::with_capacity(2);
        assert!(sink.is_empty());

        let first = PolicyEvent::Retry(RetryEvent::Succeeded { attempts: 1 });
        let second = PolicyEvent::CircuitBreaker(CircuitBreakerEvent::Opened { failure_count: 4 });
        let third =
            PolicyEvent::Timeout(TimeoutEvent::Occurred { timeout: Duration::from_secs(2) });

        sink.call(first).await.unwrap();
        sink.call(second.clone()).await.unwrap();
        sink.call(third.clone()).await.unwrap();

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.evicted(), 1);
        assert_eq!(sink.events(), vec![second, third]);

        sink.clear();
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn event_sink_forwards_to_wrapped_sink() {
        let memory = MemorySink::new();
        let handle = EventSink::new(memory.clone());
        assert!(handle.is_enabled());

        handle.emit(PolicyEvent::CircuitBreaker(CircuitBreakerEvent::HalfOpen)).await;
        assert_eq!(memory.events(), vec![PolicyEvent::CircuitBreaker(CircuitBreakerEvent::HalfOpen)]);
    }

    #[tokio::test]
    async fn disabled_event_sink_drops_events() {
        let handle = EventSink::disabled();
        assert!(!handle.is_enabled());
        handle.emit(PolicyEvent::CircuitBreaker(CircuitBreakerEvent::Closed)).await;
    }

    #[tokio::test]
    async fn emit_best_effort_swallows_errors() {
        #[derive(Clone)]
        struct Fails;
        impl Service<PolicyEvent> for Fails {
            type Response = ();
            type Error = std::io::Error;
            type Future = SinkFuture<std::io::Error>;
            fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
                Poll::Ready(Ok(()))
            }
            fn call(&mut self, _req: PolicyEvent) -> Self::Future {
                Box::pin(async { Err(std::io::Error::new(std::io::ErrorKind::Other, "fail")) })
            }
        }
        impl TelemetrySink for Fails {
            type SinkError = std::io::Error;
        }

        let handle = EventSink::new(Fails);
        handle.emit(PolicyEvent::Retry(RetryEvent::Exhausted { attempts: 3 })).await;
        emit_best_effort(Fails, PolicyEvent::Retry(RetryEvent::Exhausted { attempts: 3 })).await;
    }

    #[tokio::test]
    async fn log_sink_accepts_events() {
        let mut sink = LogSink;
        sink.call(PolicyEvent::CircuitBreaker(CircuitBreakerEvent::Rejected)).await.unwrap();
    }
}
