//! Tower integration.
//!
//! [`PolicyLayer`] wraps any [`Policy`] around a `tower::Service`. Requests travel as
//! [`Scoped`] values so the execution context set up by the policy (a timeout's deadline, for
//! instance) reaches the inner service. Because a retry re-sends the request, the request type
//! must be `Clone`, and the inner service is cloned once per attempt.
//!
//! ```rust
//! use bulwark::{Failure, PolicyLayer, RetryPolicy, Scoped, InstantSleeper};
//! use tower::{service_fn, ServiceBuilder, ServiceExt};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let retry = RetryPolicy::builder().with_sleeper(InstantSleeper).build().unwrap();
//! let svc = ServiceBuilder::new()
//!     .layer(PolicyLayer::new(retry))
//!     .service(service_fn(|req: Scoped<String>| async move {
//!         req.context.check()?;
//!         Ok::<_, Failure>(req.request.len())
//!     }));
//!
//! let len = svc.oneshot(Scoped::new(String::from("hello"))).await.unwrap();
//! assert_eq!(len, 5);
//! # });
//! ```

use crate::{ExecutionContext, Failure, Policy};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::ServiceExt;
use tower_layer::Layer;
use tower_service::Service;

/// A request together with the execution context it runs under.
#[derive(Debug, Clone)]
pub struct Scoped<Req> {
    pub request: Req,
    pub context: ExecutionContext,
}

impl<Req> Scoped<Req> {
    /// Scope `request` to a fresh root context.
    pub fn new(request: Req) -> Self {
        Self { request, context: ExecutionContext::new() }
    }

    pub fn with_context(request: Req, context: ExecutionContext) -> Self {
        Self { request, context }
    }

    pub fn into_parts(self) -> (Req, ExecutionContext) {
        (self.request, self.context)
    }
}

/// Tower layer applying a policy to every call of the wrapped service.
#[derive(Debug)]
pub struct PolicyLayer<P> {
    policy: Arc<P>,
}

impl<P> PolicyLayer<P> {
    pub fn new(policy: P) -> Self {
        Self { policy: Arc::new(policy) }
    }

    /// Share an existing policy (and its state) between several layers.
    pub fn shared(policy: Arc<P>) -> Self {
        Self { policy }
    }
}

impl<P> Clone for PolicyLayer<P> {
    fn clone(&self) -> Self {
        Self { policy: self.policy.clone() }
    }
}

impl<P, S> Layer<S> for PolicyLayer<P> {
    type Service = PolicyService<P, S>;

    fn layer(&self, inner: S) -> Self::Service {
        PolicyService { policy: self.policy.clone(), inner }
    }
}

/// Service produced by [`PolicyLayer`].
#[derive(Debug)]
pub struct PolicyService<P, S> {
    policy: Arc<P>,
    inner: S,
}

impl<P, S: Clone> Clone for PolicyService<P, S> {
    fn clone(&self) -> Self {
        Self { policy: self.policy.clone(), inner: self.inner.clone() }
    }
}

impl<P, S> PolicyService<P, S> {
    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }
}

impl<P, S, Req> Service<Scoped<Req>> for PolicyService<P, S>
where
    P: Policy<S::Response> + 'static,
    S: Service<Scoped<Req>, Error = Failure> + Clone + Send + Sync + 'static,
    S::Response: Send + 'static,
    S::Future: Send + 'static,
    Req: Clone + Send + Sync + 'static,
{
    type Response = S::Response;
    type Error = Failure;
    type Future = BoxFuture<'static, Result<S::Response, Failure>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Readiness of the inner service is awaited per attempt, inside the policy.
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Scoped<Req>) -> Self::Future {
        let policy = self.policy.clone();
        let inner = self.inner.clone();
        Box::pin(async move {
            let (request, context) = req.into_parts();
            let attempt = |ctx: ExecutionContext| {
                let svc = inner.clone();
                let request = request.clone();
                async move { svc.oneshot(Scoped::with_context(request, ctx)).await }
            };
            <P as Policy<S::Response>>::execute(&*policy, attempt, context).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Backoff, FailureKind, InstantSleeper, RetryPolicy, TimeoutPolicy};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tower::{service_fn, ServiceBuilder};

    fn retry() -> RetryPolicy {
        RetryPolicy::builder()
            .max_attempts(3)
            .backoff(Backoff::constant(Duration::from_millis(5)))
            .with_sleeper(InstantSleeper)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn retries_inner_service_calls() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let inner = service_fn(move |req: Scoped<u32>| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Failure::network("flaky"))
                } else {
                    Ok(req.request * 2)
                }
            }
        });
        let svc = ServiceBuilder::new().layer(PolicyLayer::new(retry())).service(inner);

        let out = svc.oneshot(Scoped::new(21)).await.unwrap();
        assert_eq!(out, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn inner_service_sees_policy_context() {
        let inner = service_fn(|req: Scoped<()>| async move {
            for _ in 0..100 {
                req.context.check()?;
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            Ok::<_, Failure>(())
        });
        let timeout = TimeoutPolicy::new(Duration::from_millis(50))
            .unwrap()
            .with_mode(crate::TimeoutMode::Strict);
        let svc = PolicyLayer::new(timeout).layer(inner);

        let err = svc.oneshot(Scoped::new(())).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Cancelled);
    }

    #[tokio::test]
    async fn layers_nest() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let inner = service_fn(move |_req: Scoped<&'static str>| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(Failure::resource_exhausted("bandwidth")) }
        });
        let svc = ServiceBuilder::new()
            .layer(PolicyLayer::new(TimeoutPolicy::default()))
            .layer(PolicyLayer::new(retry()))
            .service(inner);

        let err = svc.oneshot(Scoped::new("upload")).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::ResourceExhausted);
        assert_eq!(err.exhausted_after(), Some(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
