//! Fallback: substitute a value when the wrapped operation fails.
//!
//! By default every failure is handled. `handle_kinds` and `handle_when` narrow that to a
//! subset; unhandled failures pass through untouched. Recovery built with
//! [`FallbackPolicy::try_recover`] may itself fail, and that failure reaches the caller as is.
//!
//! ```rust
//! use bulwark::{FailureKind, Failure, FallbackPolicy, PolicyExt};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let fallback = FallbackPolicy::value(String::from("cached"))
//!     .handle_kinds([FailureKind::Network, FailureKind::CircuitOpen]);
//!
//! let recovered = fallback
//!     .run(|_ctx| async { Err(Failure::network("Unstable network!")) })
//!     .await;
//! assert_eq!(recovered.unwrap(), "cached");
//!
//! let surfaced = fallback
//!     .run(|_ctx| async { Err(Failure::not_found("no such user")) })
//!     .await;
//! assert_eq!(surfaced.unwrap_err().kind(), FailureKind::NotFound);
//! # });
//! ```

use crate::telemetry::{EventSink, FallbackEvent, PolicyEvent, TelemetrySink};
use crate::{ExecutionContext, Failure, FailureKind, Policy};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

type Recovery<T> = Arc<dyn Fn(&Failure) -> Result<T, Failure> + Send + Sync>;
type Handles = Arc<dyn Fn(&Failure) -> bool + Send + Sync>;

pub struct FallbackPolicy<T> {
    recovery: Recovery<T>,
    handles: Option<Handles>,
    sink: EventSink,
}

impl<T> Clone for FallbackPolicy<T> {
    fn clone(&self) -> Self {
        Self { recovery: self.recovery.clone(), handles: self.handles.clone(), sink: self.sink.clone() }
    }
}

impl<T> std::fmt::Debug for FallbackPolicy<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackPolicy")
            .field("filtered", &self.handles.is_some())
            .field("sink", &self.sink)
            .finish()
    }
}

impl<T> FallbackPolicy<T> {
    /// Substitute a fixed value.
    pub fn value(value: T) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        Self::try_recover(move |_| Ok(value.clone()))
    }

    /// Compute a substitute from the failure.
    pub fn recover<F>(recovery: F) -> Self
    where
        F: Fn(&Failure) -> T + Send + Sync + 'static,
    {
        Self::try_recover(move |failure| Ok(recovery(failure)))
    }

    /// Recovery that may fail; its failure propagates unguarded.
    pub fn try_recover<F>(recovery: F) -> Self
    where
        F: Fn(&Failure) -> Result<T, Failure> + Send + Sync + 'static,
    {
        Self { recovery: Arc::new(recovery), handles: None, sink: EventSink::disabled() }
    }

    /// Only handle failures of the listed kinds.
    pub fn handle_kinds(self, kinds: impl IntoIterator<Item = FailureKind>) -> Self {
        let kinds: Vec<FailureKind> = kinds.into_iter().collect();
        self.handle_when(move |failure| kinds.contains(&failure.kind()))
    }

    /// Only handle failures matching `predicate`.
    pub fn handle_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Failure) -> bool + Send + Sync + 'static,
    {
        self.handles = Some(Arc::new(predicate));
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

    fn handles(&self, failure: &Failure) -> bool {
        self.handles.as_ref().map_or(true, |handles| handles(failure))
    }
}

#[async_trait]
impl<T> Policy<T> for FallbackPolicy<T>
where
    T: Send + 'static,
{
    async fn execute<Op, Fut>(&self, operation: Op, ctx: ExecutionContext) -> Result<T, Failure>
    where
        Op: Fn(ExecutionContext) -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, Failure>> + Send,
    {
        match operation(ctx).await {
            Err(failure) if self.handles(&failure) => {
                tracing::debug!(error = %failure, "fallback substituting result");
                self.sink
                    .emit(PolicyEvent::Fallback(FallbackEvent::Recovered { kind: failure.kind() }))
                    .await;
                (self.recovery)(&failure)
            }
            outcome => outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::MemorySink;
    use crate::PolicyExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn permanently_failing_operation_yields_substitute() {
        let fallback = FallbackPolicy::value(-1);
        for _ in 0..3 {
            let result = fallback.run(|_ctx| async { Err(Failure::generic("broken")) }).await;
            assert_eq!(result.unwrap(), -1);
        }
    }

    #[tokio::test]
    async fn success_is_untouched() {
        let fallback = FallbackPolicy::value(0);
        assert_eq!(fallback.run(|_ctx| async { Ok(7) }).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn recovery_sees_the_failure() {
        let fallback = FallbackPolicy::recover(|failure: &Failure| failure.status_code());
        let result = fallback.run(|_ctx| async { Err(Failure::not_found("nobody")) }).await;
        assert_eq!(result.unwrap(), 404);
    }

    #[tokio::test]
    async fn failing_recovery_propagates() {
        let fallback = FallbackPolicy::<()>::try_recover(|_| Err(Failure::generic("cache offline")));
        let err = fallback.run(|_ctx| async { Err(Failure::network("down")) }).await.unwrap_err();
        assert_eq!(err, Failure::generic("cache offline"));
    }

    #[tokio::test]
    async fn unhandled_kinds_pass_through() {
        let recoveries = Arc::new(AtomicUsize::new(0));
        let counter = recoveries.clone();
        let fallback = FallbackPolicy::recover(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            "fallback"
        })
        .handle_kinds([FailureKind::Timeout, FailureKind::CircuitOpen]);

        let err = fallback.run(|_ctx| async { Err(Failure::network("down")) }).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Network);
        assert_eq!(recoveries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn handle_when_uses_predicate() {
        let fallback = FallbackPolicy::value("default").handle_when(|f| f.is_retry_exhausted());

        let exhausted =
            fallback.run(|_ctx| async { Err(Failure::network("down").exhausted(3)) }).await;
        assert_eq!(exhausted.unwrap(), "default");

        let plain = fallback.run(|_ctx| async { Err(Failure::network("down")) }).await;
        assert!(plain.is_err());
    }

    #[tokio::test]
    async fn emits_recovered_event() {
        let sink = MemorySink::new();
        let fallback = FallbackPolicy::value(()).with_sink(sink.clone());
        fallback.run(|_ctx| async { Err(Failure::resource_exhausted("full")) }).await.unwrap();
        assert_eq!(
            sink.events(),
            vec![PolicyEvent::Fallback(FallbackEvent::Recovered {
                kind: FailureKind::ResourceExhausted
            })]
        );
    }
}
