//! Prebuilt resilience chain
//!
//! Layer order, outermost first: Bulkhead → CircuitBreaker → Timeout → Retry → Operation.
//! The bulkhead bounds whole calls. The breaker counts one outcome per finished sequence,
//! timeouts included, since the timeout sits inside it and bounds the complete retry sequence.
//! Every layer is optional; an absent layer passes straight through.

use crate::composer::wrap;
use crate::{
    BulkheadPolicy, CircuitBreakerPolicy, ExecutionContext, Failure, Policy, RetryPolicy,
    TimeoutPolicy,
};
use async_trait::async_trait;
use std::future::Future;

#[derive(Debug, Clone)]
pub struct ResilienceStack {
    pub(crate) bulkhead: Option<BulkheadPolicy>,
    pub(crate) timeout: Option<TimeoutPolicy>,
    pub(crate) circuit_breaker: Option<CircuitBreakerPolicy>,
    pub(crate) retry: Option<RetryPolicy>,
}

impl ResilienceStack {
    /// Start from an empty stack; add the layers you need.
    pub fn builder() -> ResilienceStackBuilder {
        ResilienceStackBuilder::new()
    }

    pub fn bulkhead(&self) -> Option<&BulkheadPolicy> {
        self.bulkhead.as_ref()
    }

    pub fn timeout(&self) -> Option<&TimeoutPolicy> {
        self.timeout.as_ref()
    }

    pub fn circuit_breaker(&self) -> Option<&CircuitBreakerPolicy> {
        self.circuit_breaker.as_ref()
    }

    pub fn retry(&self) -> Option<&RetryPolicy> {
        self.retry.as_ref()
    }
}

impl Default for ResilienceStack {
    /// Every layer with its default configuration.
    fn default() -> Self {
        Self {
            bulkhead: Some(BulkheadPolicy::default()),
            timeout: Some(TimeoutPolicy::default()),
            circuit_breaker: Some(CircuitBreakerPolicy::default()),
            retry: Some(RetryPolicy::default()),
        }
    }
}

#[async_trait]
impl<T> Policy<T> for ResilienceStack
where
    T: Send + 'static,
{
    async fn execute<Op, Fut>(&self, operation: Op, ctx: ExecutionContext) -> Result<T, Failure>
    where
        Op: Fn(ExecutionContext) -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, Failure>> + Send,
    {
        let chain = wrap(
            &self.bulkhead,
            wrap(&self.circuit_breaker, wrap(&self.timeout, &self.retry)),
        );
        chain.execute(operation, ctx).await
    }
}

#[derive(Debug, Default)]
pub struct ResilienceStackBuilder {
    bulkhead: Option<BulkheadPolicy>,
    timeout: Option<TimeoutPolicy>,
    circuit_breaker: Option<CircuitBreakerPolicy>,
    retry: Option<RetryPolicy>,
}

impl ResilienceStackBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bulkhead(mut self, policy: BulkheadPolicy) -> Self {
        self.bulkhead = Some(policy);
        self
    }

    pub fn timeout(mut self, policy: TimeoutPolicy) -> Self {
        self.timeout = Some(policy);
        self
    }

    pub fn circuit_breaker(mut self, policy: CircuitBreakerPolicy) -> Self {
        self.circuit_breaker = Some(policy);
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn build(self) -> ResilienceStack {
        ResilienceStack {
            bulkhead: self.bulkhead,
            timeout: self.timeout,
            circuit_breaker: self.circuit_breaker,
            retry: self.retry,
        }
    }
}
