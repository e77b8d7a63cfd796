//! Cooperative CPU-bound workload.

use bulwark::{ExecutionContext, Failure};
use futures::future::BoxFuture;

/// Naive recursive Fibonacci that checks `ctx` before and after its recursive steps.
///
/// It yields to the scheduler every few levels so a timeout running on the same task gets a
/// chance to fire and set the signal.
pub fn fibonacci(n: u64, ctx: ExecutionContext) -> BoxFuture<'static, Result<u64, Failure>> {
    Box::pin(async move {
        ctx.check()?;
        if n <= 1 {
            return Ok(n);
        }
        if n % 8 == 0 {
            tokio::task::yield_now().await;
        }

        let left = fibonacci(n - 1, ctx.clone()).await?;
        let right = fibonacci(n - 2, ctx.clone()).await?;

        ctx.check()?;
        sum(left, right)
    })
}

// fib(93) is the largest value that fits in a u64.
fn sum(left: u64, right: u64) -> Result<u64, Failure> {
    left.checked_add(right).ok_or_else(|| Failure::generic("fibonacci overflow"))
}
