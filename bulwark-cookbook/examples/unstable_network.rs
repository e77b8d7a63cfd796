//! Breaker around retry against a saturated network.
//!
//! Each lookup is retried 3 times, 1s apart. The simulated bandwidth only recovers after 5s
//! of quiet, so every retry sequence fails and the breaker opens after the fourth one.

use bulwark::prelude::*;
use bulwark::telemetry::LogSink;
use bulwark_cookbook::{BandwidthSimulator, UserDirectory, UserService};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    println!("=== Bulwark: Unstable Network ===\n");

    let service = UserService::new(UserDirectory::new(), BandwidthSimulator::new());
    service.add_user("Ada Lovelace", "ada@example.com").await;

    let breaker = bulwark_cookbook::circuit_breaker_policy()?.with_sink(LogSink);
    let retry = RetryPolicy::builder()
        .max_attempts(3)
        .backoff(Backoff::constant(Duration::from_secs(1)))
        .with_sink(LogSink)
        .build()?;
    let policy = wrap(breaker.clone(), retry);

    for call in 1..=6 {
        let result = policy
            .run(|_ctx| {
                let service = service.clone();
                async move { service.network_exhaustion("ada@example.com").await }
            })
            .await;
        match result {
            Ok(user) => println!("✓ call {}: found {}", call, user.name),
            Err(failure) => println!("✗ call {}: {}", call, failure),
        }
        println!("  breaker: {:?} ({} failures)\n", breaker.state(), breaker.failure_count());
    }

    Ok(())
}
