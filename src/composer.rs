//! Explicit policy composition.
//!
//! `wrap(outer, inner)` produces a [`Wrap`] whose outer policy treats the inner policy's whole
//! `execute` call as its operation: `Outer(Inner(Operation))`. Order matters. With a circuit
//! breaker outside a retry, the breaker observes one outcome per completed retry sequence,
//! not one per attempt. Chains nest arbitrarily, and the execution context passes through
//! every layer that does not originate its own.
//!
//! ```rust
//! use bulwark::{chain, Backoff, BulkheadPolicy, Failure, PolicyExt, RetryPolicy, TimeoutPolicy};
//! use std::time::Duration;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let retry = RetryPolicy::builder()
//!     .backoff(Backoff::constant(Duration::from_millis(1)))
//!     .build()
//!     .unwrap();
//! // Bulkhead(Timeout(Retry(operation)))
//! let policy = chain![
//!     BulkheadPolicy::new(2, 2).unwrap(),
//!     TimeoutPolicy::new(Duration::from_secs(2)).unwrap(),
//!     retry,
//! ];
//! let value = policy.run(|_ctx| async { Ok::<_, Failure>(7) }).await.unwrap();
//! assert_eq!(value, 7);
//! # });
//! ```

use crate::{ExecutionContext, Failure, Policy};
use async_trait::async_trait;
use std::future::Future;

/// Sequential composition: `outer` wraps `inner`, which wraps the operation.
#[derive(Clone, Copy, Debug)]
pub struct Wrap<O, I> {
    outer: O,
    inner: I,
}

impl<O, I> Wrap<O, I> {
    pub fn new(outer: O, inner: I) -> Self {
        Self { outer, inner }
    }

    pub fn outer(&self) -> &O {
        &self.outer
    }

    pub fn inner(&self) -> &I {
        &self.inner
    }

    pub fn into_parts(self) -> (O, I) {
        (self.outer, self.inner)
    }
}

/// Compose two policies; `outer` sees the full outcome of `inner`.
pub fn wrap<O, I>(outer: O, inner: I) -> Wrap<O, I> {
    Wrap::new(outer, inner)
}

/// Nest any number of policies, outermost first: `chain![a, b, c]` is `wrap(a, wrap(b, c))`.
#[macro_export]
macro_rules! chain {
    ($only:expr $(,)?) => {
        $only
    };
    ($outer:expr, $($rest:expr),+ $(,)?) => {
        $crate::wrap($outer, $crate::chain!($($rest),+))
    };
}

#[async_trait]
impl<T, O, I> Policy<T> for Wrap<O, I>
where
    T: Send + 'static,
    O: Policy<T>,
    I: Policy<T>,
{
    async fn execute<Op, Fut>(&self, operation: Op, ctx: ExecutionContext) -> Result<T, Failure>
    where
        Op: Fn(ExecutionContext) -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, Failure>> + Send,
    {
        let inner = &self.inner;
        let operation = &operation;
        <O as Policy<T>>::execute(
            &self.outer,
            move |ctx| <I as Policy<T>>::execute(inner, operation, ctx),
            ctx,
        )
        .await
    }
}

/// Identity policy: invokes the operation once, unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct Passthrough;

#[async_trait]
impl<T> Policy<T> for Passthrough
where
    T: Send + 'static,
{
    async fn execute<Op, Fut>(&self, operation: Op, ctx: ExecutionContext) -> Result<T, Failure>
    where
        Op: Fn(ExecutionContext) -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, Failure>> + Send,
    {
        operation(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PolicyExt;
    use std::sync::{Arc, Mutex};

    /// Records enter/exit order so nesting is observable.
    #[derive(Clone)]
    struct Trace {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl<T: Send + 'static> Policy<T> for Trace {
        async fn execute<Op, Fut>(&self, operation: Op, ctx: ExecutionContext) -> Result<T, Failure>
        where
            Op: Fn(ExecutionContext) -> Fut + Send + Sync,
            Fut: Future<Output = Result<T, Failure>> + Send,
        {
            self.log.lock().unwrap().push(format!("enter {}", self.name));
            let result = operation(ctx).await;
            self.log.lock().unwrap().push(format!("exit {}", self.name));
            result
        }
    }

    #[tokio::test]
    async fn outer_wraps_inner_which_wraps_operation() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let outer = Trace { name: "outer", log: log.clone() };
        let inner = Trace { name: "inner", log: log.clone() };
        let op_log = log.clone();

        let result = wrap(outer, inner)
            .run(move |_ctx| {
                let op_log = op_log.clone();
                async move {
                    op_log.lock().unwrap().push("operation".to_string());
                    Ok::<_, Failure>(1)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 1);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["enter outer", "enter inner", "operation", "exit inner", "exit outer"]
        );
    }

    #[tokio::test]
    async fn chain_macro_nests_outermost_first() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let policy = chain![
            Trace { name: "a", log: log.clone() },
            Trace { name: "b", log: log.clone() },
            Trace { name: "c", log: log.clone() },
        ];

        policy.run(|_ctx| async { Ok::<_, Failure>(()) }).await.unwrap();

        let entered: Vec<String> =
            log.lock().unwrap().iter().filter(|l| l.starts_with("enter")).cloned().collect();
        assert_eq!(entered, vec!["enter a", "enter b", "enter c"]);
    }

    #[tokio::test]
    async fn context_passes_through_layers_unchanged() {
        let ctx = ExecutionContext::new();
        let observer = ctx.clone();
        let policy = Passthrough.wrap(Passthrough).wrap(Passthrough);

        let result = policy
            .execute(
                move |seen: ExecutionContext| {
                    let observer = observer.clone();
                    async move {
                        observer.cancel();
                        Ok::<_, Failure>(seen.is_cancelled())
                    }
                },
                ctx,
            )
            .await;

        assert!(result.unwrap(), "operation must see the caller's signal");
    }

    #[tokio::test]
    async fn failures_propagate_outward_unchanged() {
        let policy = wrap(Passthrough, Passthrough);
        let err = policy
            .run(|_ctx| async { Err::<(), _>(Failure::not_found("no such user")) })
            .await
            .unwrap_err();
        assert_eq!(err, Failure::not_found("no such user"));
    }
}
