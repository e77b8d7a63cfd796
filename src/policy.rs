//! The uniform execution contract shared by every policy.
//!
//! An operation is any `Fn(ExecutionContext) -> Future<Output = Result<T, Failure>>`. Its input
//! is captured by the closure, and it must tolerate repeated invocation because retry policies
//! call it again. A policy's `execute` takes the operation plus the context handed down by the
//! caller and returns the operation's result, a substituted value, or a typed [`Failure`].
//!
//! `&P`, `Arc<P>`, and `Option<P>` are policies too: chains can borrow shared instances, and a
//! `None` layer passes straight through to the operation.

use crate::composer::Wrap;
use crate::{ExecutionContext, Failure};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

/// A resilience behavior wrapping an operation.
#[async_trait]
pub trait Policy<T>: Send + Sync
where
    T: Send + 'static,
{
    /// Run `operation` under this policy, threading `ctx` down to it.
    async fn execute<Op, Fut>(&self, operation: Op, ctx: ExecutionContext) -> Result<T, Failure>
    where
        Op: Fn(ExecutionContext) -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, Failure>> + Send;
}

/// Composition and convenience helpers available on every value.
pub trait PolicyExt: Sized {
    /// Make `self` the outer layer around `inner`.
    fn wrap<I>(self, inner: I) -> Wrap<Self, I> {
        Wrap::new(self, inner)
    }

    /// Execute with a fresh root context (no deadline, never cancelled).
    fn run<'a, T, Op, Fut>(&'a self, operation: Op) -> BoxFuture<'a, Result<T, Failure>>
    where
        Self: Policy<T>,
        T: Send + 'static,
        Op: Fn(ExecutionContext) -> Fut + Send + Sync + 'a,
        Fut: Future<Output = Result<T, Failure>> + Send + 'a,
    {
        self.execute(operation, ExecutionContext::new())
    }
}

impl<P> PolicyExt for P {}

#[async_trait]
impl<T, P> Policy<T> for &P
where
    T: Send + 'static,
    P: Policy<T>,
{
    async fn execute<Op, Fut>(&self, operation: Op, ctx: ExecutionContext) -> Result<T, Failure>
    where
        Op: Fn(ExecutionContext) -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, Failure>> + Send,
    {
        <P as Policy<T>>::execute(*self, operation, ctx).await
    }
}

#[async_trait]
impl<T, P> Policy<T> for Arc<P>
where
    T: Send + 'static,
    P: Policy<T>,
{
    async fn execute<Op, Fut>(&self, operation: Op, ctx: ExecutionContext) -> Result<T, Failure>
    where
        Op: Fn(ExecutionContext) -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, Failure>> + Send,
    {
        <P as Policy<T>>::execute(self.as_ref(), operation, ctx).await
    }
}

#[async_trait]
impl<T, P> Policy<T> for Option<P>
where
    T: Send + 'static,
    P: Policy<T>,
{
    async fn execute<Op, Fut>(&self, operation: Op, ctx: ExecutionContext) -> Result<T, Failure>
    where
        Op: Fn(ExecutionContext) -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, Failure>> + Send,
    {
        match self {
            Some(policy) => <P as Policy<T>>::execute(policy, operation, ctx).await,
            None => operation(ctx).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Passthrough;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn none_layer_calls_operation_directly() {
        let layer: Option<Passthrough> = None;
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let result = layer
            .run(move |_ctx| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, Failure>(5)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 5);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn shared_and_borrowed_policies_delegate() {
        let shared = Arc::new(Passthrough);
        let borrowed = &Passthrough;

        let a = shared.run(|_ctx| async { Ok::<_, Failure>("arc") }).await;
        let b = borrowed.run(|_ctx| async { Ok::<_, Failure>("ref") }).await;
        assert_eq!(a.unwrap(), "arc");
        assert_eq!(b.unwrap(), "ref");
    }

    #[tokio::test]
    async fn context_reaches_operation() {
        let ctx = ExecutionContext::new();
        ctx.cancel();
        let result = Passthrough
            .execute(|ctx| async move { ctx.check().map(|_| 1) }, ctx)
            .await;
        assert!(result.unwrap_err().is_cancellation());
    }
}
