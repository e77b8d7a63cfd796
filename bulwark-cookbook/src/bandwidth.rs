//! Synthetic resource-exhaustion workload.
//!
//! The simulator tracks a bandwidth utilization percentage. A call made more than
//! `recovery_after` after the previous one lowers utilization by `step`, never below `floor`.
//! Above `limit` the call fails with a retryable network failure; otherwise it succeeds and
//! utilization jumps back to a random value in `[75, 100)`. The failure pattern depends on both
//! timing and history, which is exactly what the retry recipes have to cope with.

use bulwark::{Clock, Failure, MonotonicClock};
use rand::Rng;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug)]
struct Usage {
    utilization: u32,
    last_invocation_millis: u64,
}

/// One simulator per scenario; clones share utilization.
#[derive(Debug, Clone)]
pub struct BandwidthSimulator {
    usage: Arc<Mutex<Usage>>,
    clock: Arc<dyn Clock>,
    recovery_after: Duration,
    step: u32,
    floor: u32,
    limit: u32,
}

impl BandwidthSimulator {
    /// Start saturated: utilization is drawn from `[75, 100)`.
    pub fn new() -> Self {
        Self::with_clock(MonotonicClock::default())
    }

    pub fn with_clock<C: Clock + 'static>(clock: C) -> Self {
        let now = clock.now_millis();
        Self {
            usage: Arc::new(Mutex::new(Usage {
                utilization: saturated(),
                last_invocation_millis: now,
            })),
            clock: Arc::new(clock),
            recovery_after: Duration::from_millis(5000),
            step: 10,
            floor: 70,
            limit: 75,
        }
    }

    /// Pin the current utilization, e.g. to script a test.
    pub fn with_utilization(self, utilization: u32) -> Self {
        self.lock().utilization = utilization;
        self
    }

    pub fn utilization(&self) -> u32 {
        self.lock().utilization
    }

    /// Consume bandwidth once.
    pub fn consume(&self) -> Result<(), Failure> {
        let now = self.clock.now_millis();
        let mut usage = self.lock();
        let idle = Duration::from_millis(now.saturating_sub(usage.last_invocation_millis));
        if idle > self.recovery_after {
            usage.utilization = usage.utilization.saturating_sub(self.step).max(self.floor);
        }
        usage.last_invocation_millis = now;

        tracing::debug!(utilization = usage.utilization, "current bandwidth utilization");
        if usage.utilization > self.limit {
            return Err(Failure::network("Timed out!"));
        }
        usage.utilization = saturated();
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Usage> {
        self.usage.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for BandwidthSimulator {
    fn default() -> Self {
        Self::new()
    }
}

fn saturated() -> u32 {
    rand::rng().random_range(75..100)
}
