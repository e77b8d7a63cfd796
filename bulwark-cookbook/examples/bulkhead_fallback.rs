//! Bulkhead shedding load, with a fallback turning rejections into a cached answer.
//! The same chain is then mounted on a tower service.

use bulwark::prelude::*;
use bulwark::telemetry::MemorySink;
use bulwark::{PolicyLayer, Scoped};
use std::sync::Arc;
use std::time::Duration;
use tower::{ServiceBuilder, ServiceExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    println!("=== Bulwark: Bulkhead + Fallback ===\n");

    let sink = MemorySink::new();
    let bulkhead = bulwark_cookbook::bulkhead_policy()?.with_sink(sink.clone());
    let fallback = bulwark_cookbook::fallback_policy(String::from("cached report"))
        .handle_kinds([FailureKind::BulkheadFull]);
    let policy = Arc::new(wrap(fallback, bulkhead));

    // 2 run, 2 wait, the rest fall back.
    let mut handles = Vec::new();
    for id in 0..6 {
        let policy = policy.clone();
        handles.push(tokio::spawn(async move {
            policy
                .run(move |_ctx| async move {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Ok::<_, Failure>(format!("fresh report #{}", id))
                })
                .await
        }));
    }
    for handle in handles {
        match handle.await? {
            Ok(report) => println!("✓ {}", report),
            Err(failure) => println!("✗ {}", failure),
        }
    }

    println!("\nBulkhead events:");
    for event in sink.events() {
        println!("  - {}", event);
    }

    println!("\n=== As a tower layer ===\n");
    let svc = ServiceBuilder::new()
        .layer(PolicyLayer::shared(policy))
        .service_fn(|req: Scoped<&'static str>| async move {
            req.context.check()?;
            Ok::<_, Failure>(format!("served {}", req.request))
        });
    let response = svc.oneshot(Scoped::new("tower request")).await?;
    println!("✓ {}", response);

    Ok(())
}
