//! Bulkhead: bounded concurrency with a bounded FIFO queue
//!
//! Two semaphores back each bulkhead. The admission semaphore holds `max_concurrency +
//! max_queue` permits and is only ever `try_acquire`d, so callers beyond the combined capacity
//! are rejected immediately. Admitted callers then wait on the execution semaphore, which
//! tokio serves in arrival order. Both permits are RAII guards: they are released when the
//! call completes, fails, panics, or is dropped by an outer layer.

use crate::telemetry::{BulkheadEvent, EventSink, PolicyEvent, TelemetrySink};
use crate::{ExecutionContext, Failure, Policy};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BulkheadError {
    #[error("max_concurrency must be > 0")]
    ZeroConcurrency,
    #[error("bulkhead capacity {requested} exceeds the supported maximum {max}")]
    CapacityTooLarge { requested: usize, max: usize },
}

#[derive(Debug, Clone)]
pub struct BulkheadPolicy {
    admission: Arc<Semaphore>,
    execution: Arc<Semaphore>,
    max_concurrency: usize,
    max_queue: usize,
    sink: EventSink,
}

impl BulkheadPolicy {
    /// `max_concurrency` execution slots plus `max_queue` waiting slots. The queue may be empty.
    pub fn new(max_concurrency: usize, max_queue: usize) -> Result<Self, BulkheadError> {
        if max_concurrency == 0 {
            return Err(BulkheadError::ZeroConcurrency);
        }
        let capacity = max_concurrency
            .checked_add(max_queue)
            .filter(|total| *total <= Semaphore::MAX_PERMITS)
            .ok_or(BulkheadError::CapacityTooLarge {
                requested: max_concurrency.saturating_add(max_queue),
                max: Semaphore::MAX_PERMITS,
            })?;
        Ok(Self {
            admission: Arc::new(Semaphore::new(capacity)),
            execution: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
            max_queue,
            sink: EventSink::disabled(),
        })
    }

    pub fn with_sink<S>(mut self, sink: S) -> Self
    where
        S: TelemetrySink,
        S::Future: Send + 'static,
    {
        self.sink = EventSink::new(sink);
        self
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn max_queue(&self) -> usize {
        self.max_queue
    }

    /// Calls currently holding an execution slot.
    pub fn in_flight(&self) -> usize {
        self.max_concurrency.saturating_sub(self.execution.available_permits())
    }

    /// Admitted calls still waiting for an execution slot.
    pub fn queued(&self) -> usize {
        let admitted = (self.max_concurrency + self.max_queue)
            .saturating_sub(self.admission.available_permits());
        admitted.saturating_sub(self.in_flight())
    }

    async fn emit(&self, event: BulkheadEvent) {
        self.sink.emit(PolicyEvent::Bulkhead(event)).await;
    }
}

impl Default for BulkheadPolicy {
    /// Two execution slots, two queue slots.
    fn default() -> Self {
        let capacity = 4;
        Self {
            admission: Arc::new(Semaphore::new(capacity)),
            execution: Arc::new(Semaphore::new(2)),
            max_concurrency: 2,
            max_queue: 2,
            sink: EventSink::disabled(),
        }
    }
}

#[async_trait]
impl<T> Policy<T> for BulkheadPolicy
where
    T: Send + 'static,
{
    async fn execute<Op, Fut>(&self, operation: Op, ctx: ExecutionContext) -> Result<T, Failure>
    where
        Op: Fn(ExecutionContext) -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, Failure>> + Send,
    {
        let Ok(_admitted) = self.admission.try_acquire() else {
            let (in_flight, queued) = (self.in_flight(), self.queued());
            tracing::debug!(in_flight, queued, "bulkhead full; rejecting call");
            self.emit(BulkheadEvent::Rejected { in_flight, queued }).await;
            return Err(Failure::bulkhead_full(in_flight, queued));
        };

        let _slot = match self.execution.try_acquire() {
            Ok(slot) => slot,
            Err(_) => {
                let queued = self.queued();
                tracing::debug!(queued, max_queue = self.max_queue, "bulkhead queueing call");
                self.emit(BulkheadEvent::Queued { queued, max_queue: self.max_queue }).await;
                tokio::select! {
                    biased;
                    _ = ctx.cancelled() => {
                        return Err(Failure::cancelled("cancelled while waiting for a bulkhead slot"));
                    }
                    slot = self.execution.acquire() => match slot {
                        Ok(slot) => slot,
                        Err(_) => return Err(Failure::bulkhead_full(self.in_flight(), self.queued())),
                    },
                }
            }
        };

        self.emit(BulkheadEvent::Acquired {
            in_flight: self.in_flight(),
            max_concurrency: self.max_concurrency,
        })
        .await;
        operation(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::MemorySink;
    use crate::{FailureKind, PolicyExt};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::task::JoinHandle;

    /// Spawn a call that blocks inside the operation until `gate` hands out a permit.
    fn hold(
        bulkhead: &BulkheadPolicy,
        gate: &Arc<Semaphore>,
        calls: &Arc<AtomicUsize>,
    ) -> JoinHandle<Result<(), Failure>> {
        let bulkhead = bulkhead.clone();
        let gate = gate.clone();
        let calls = calls.clone();
        tokio::spawn(async move {
            bulkhead
                .run(move |_ctx| {
                    let gate = gate.clone();
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        let _ = gate.acquire().await.map(|p| p.forget());
                        Ok(())
                    }
                })
                .await
        })
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn fifth_concurrent_call_is_rejected_without_invocation() {
        let bulkhead = BulkheadPolicy::new(2, 2).unwrap();
        let gate = Arc::new(Semaphore::new(0));
        let calls = Arc::new(AtomicUsize::new(0));

        let held: Vec<_> = (0..4).map(|_| hold(&bulkhead, &gate, &calls)).collect();
        settle().await;
        assert_eq!(bulkhead.in_flight(), 2);
        assert_eq!(bulkhead.queued(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let counter = calls.clone();
        let rejected = bulkhead
            .run(move |_ctx| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok::<(), Failure>(()) }
            })
            .await
            .unwrap_err();
        assert_eq!(rejected.kind(), FailureKind::BulkheadFull);
        assert_eq!(calls.load(Ordering::SeqCst), 2, "rejected call must not run");

        gate.add_permits(4);
        for handle in held {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(bulkhead.in_flight(), 0);
        assert_eq!(bulkhead.queued(), 0);
    }

    #[tokio::test]
    async fn failing_operation_releases_slot() {
        let bulkhead = BulkheadPolicy::new(1, 0).unwrap();
        for _ in 0..3 {
            let err = bulkhead
                .run(|_ctx| async { Err::<(), _>(Failure::network("down")) })
                .await
                .unwrap_err();
            assert_eq!(err.kind(), FailureKind::Network);
        }
        assert_eq!(bulkhead.in_flight(), 0);
        bulkhead.run(|_ctx| async { Ok::<_, Failure>(()) }).await.unwrap();
    }

    #[tokio::test]
    async fn dropped_call_releases_slot() {
        let bulkhead = BulkheadPolicy::new(1, 0).unwrap();
        let pending = bulkhead.run(|_ctx| futures::future::pending::<Result<(), Failure>>());
        assert!(tokio::time::timeout(Duration::from_millis(10), pending).await.is_err());
        assert_eq!(bulkhead.in_flight(), 0);
    }

    #[tokio::test]
    async fn queued_calls_run_in_arrival_order() {
        let bulkhead = BulkheadPolicy::new(1, 3).unwrap();
        let gate = Arc::new(Semaphore::new(0));
        let calls = Arc::new(AtomicUsize::new(0));
        let first = hold(&bulkhead, &gate, &calls);
        settle().await;

        let order = Arc::new(Mutex::new(Vec::new()));
        let mut waiters = Vec::new();
        for id in 0..3 {
            let task_bulkhead = bulkhead.clone();
            let order = order.clone();
            waiters.push(tokio::spawn(async move {
                task_bulkhead
                    .run(move |_ctx| {
                        order.lock().unwrap().push(id);
                        async { Ok::<_, Failure>(()) }
                    })
                    .await
            }));
            while bulkhead.queued() < id + 1 {
                tokio::task::yield_now().await;
            }
        }

        gate.add_permits(1);
        first.await.unwrap().unwrap();
        for waiter in waiters {
            waiter.await.unwrap().unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn cancelled_waiter_leaves_queue() {
        let bulkhead = BulkheadPolicy::new(1, 1).unwrap();
        let gate = Arc::new(Semaphore::new(0));
        let calls = Arc::new(AtomicUsize::new(0));
        let holder = hold(&bulkhead, &gate, &calls);
        settle().await;

        let ctx = ExecutionContext::new();
        let waiter = {
            let bulkhead = bulkhead.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move {
                bulkhead.execute(|_ctx| async { Ok::<_, Failure>(()) }, ctx).await
            })
        };
        settle().await;
        assert_eq!(bulkhead.queued(), 1);

        ctx.cancel();
        let failure = waiter.await.unwrap().unwrap_err();
        assert_eq!(failure.kind(), FailureKind::Cancelled);
        assert_eq!(bulkhead.queued(), 0);

        gate.add_permits(1);
        holder.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn emits_acquire_queue_and_reject_events() {
        let sink = MemorySink::new();
        let bulkhead = BulkheadPolicy::new(1, 1).unwrap().with_sink(sink.clone());
        let gate = Arc::new(Semaphore::new(0));
        let calls = Arc::new(AtomicUsize::new(0));

        let a = hold(&bulkhead, &gate, &calls);
        settle().await;
        let b = hold(&bulkhead, &gate, &calls);
        settle().await;
        let _ = bulkhead.run(|_ctx| async { Ok::<_, Failure>(()) }).await;

        let events = sink.events();
        assert_eq!(
            &events[..3],
            &[
                PolicyEvent::Bulkhead(BulkheadEvent::Acquired { in_flight: 1, max_concurrency: 1 }),
                PolicyEvent::Bulkhead(BulkheadEvent::Queued { queued: 1, max_queue: 1 }),
                PolicyEvent::Bulkhead(BulkheadEvent::Rejected { in_flight: 1, queued: 1 }),
            ]
        );

        gate.add_permits(2);
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();
    }

    #[test]
    fn validates_capacity() {
        assert_eq!(BulkheadPolicy::new(0, 2).unwrap_err(), BulkheadError::ZeroConcurrency);
        assert!(BulkheadPolicy::new(1, 0).is_ok());
        assert!(matches!(
            BulkheadPolicy::new(usize::MAX, 1),
            Err(BulkheadError::CapacityTooLarge { .. })
        ));
        let defaults = BulkheadPolicy::default();
        assert_eq!((defaults.max_concurrency(), defaults.max_queue()), (2, 2));
    }
}
