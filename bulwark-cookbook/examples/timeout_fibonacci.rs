//! Timeout with cooperative cancellation around a CPU-bound computation.

use bulwark::prelude::*;
use bulwark_cookbook::{fibonacci, BandwidthSimulator, UserDirectory, UserService};
use std::time::{Duration, Instant};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    println!("=== Bulwark: Timeout + Cancellation ===\n");

    let service = UserService::new(UserDirectory::new(), BandwidthSimulator::new());
    service.add_user("Grace Hopper", "grace@example.com").await;

    // Finishes well inside the 2s deadline.
    let timeout = bulwark_cookbook::timeout_policy()?;
    let user = timeout
        .run(|ctx| {
            let service = service.clone();
            async move { service.time_consuming_task("grace@example.com", 20, ctx).await }
        })
        .await?;
    println!("✓ fast task found {}\n", user.name);

    for mode in [TimeoutMode::AbortOnReturn, TimeoutMode::Strict] {
        let timeout = TimeoutPolicy::new(Duration::from_millis(200))?.with_mode(mode);
        let started = Instant::now();
        let result = timeout.run(|ctx| fibonacci(90, ctx)).await;
        match result {
            Ok(value) => println!("? {:?}: fib(90) = {} (unexpectedly fast)", mode, value),
            Err(failure) => println!(
                "✗ {:?}: {} after {:?} (cancellation: {})",
                mode,
                failure,
                started.elapsed(),
                failure.is_cancellation()
            ),
        }
    }

    Ok(())
}
