//! Exponential backoff penalty.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::PenaltyStrategy;

pub const DEFAULT_BACKOFF_STEP: Duration = Duration::from_millis(100);

/// Upper bound for any configured maximum.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60 * 60);

// 2^31 fits in a u32 multiplier.
const MAX_EXPONENT: u32 = 31;

/// Exponential backoff: `min(step * 2^count, max)`.
///
/// The counter saturates once `step * 2^count` reaches `max`, so it can never
/// overflow no matter how long the failures last.
///
/// Example with step=100ms, max=2s:
/// - 100ms, 200ms, 400ms, 800ms, 1600ms, 2000ms, 2000ms, ...
#[derive(Debug)]
pub struct BackoffDelayPenalty {
    max: Duration,
    step: Duration,
    cap_count: u32,
    counter: AtomicU32,
}

impl BackoffDelayPenalty {
    pub fn new(max: Duration, step: Duration) -> Self {
        let max = max.min(MAX_BACKOFF);
        Self {
            max,
            step,
            cap_count: cap_exponent(step, max),
            counter: AtomicU32::new(0),
        }
    }

    pub fn with_default_step(max: Duration) -> Self {
        Self::new(max, DEFAULT_BACKOFF_STEP)
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn count(&self) -> u32 {
        self.counter.load(Ordering::Acquire)
    }

    /// The delay applied after `count` previous failures.
    pub fn delay_for(&self, count: u32) -> Duration {
        let exponent = count.min(self.cap_count);
        self.step.saturating_mul(1u32 << exponent).min(self.max)
    }

    fn increment(&self) {
        let cap = self.cap_count;
        // Err means the counter is already saturated.
        let _ = self
            .counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                (count < cap).then_some(count + 1)
            });
    }
}

#[async_trait]
impl PenaltyStrategy for BackoffDelayPenalty {
    async fn apply_and_increment(&self) {
        let delay = self.delay_for(self.count());
        self.increment();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn reset(&self) {
        self.counter.store(0, Ordering::Release);
    }
}

/// Smallest exponent at which `step * 2^exponent` reaches `max`.
fn cap_exponent(step: Duration, max: Duration) -> u32 {
    if step.is_zero() {
        return 0;
    }
    let mut exponent = 0;
    while exponent < MAX_EXPONENT && step.saturating_mul(1u32 << exponent) < max {
        exponent += 1;
    }
    exponent
}
