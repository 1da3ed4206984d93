use std::time::Duration;

use async_trait::async_trait;

use super::PenaltyStrategy;

/// Waits the same amount every time. Keeps no counter, so `reset` does nothing.
#[derive(Debug, Clone)]
pub struct FixedDelayPenalty {
    delay: Duration,
}

impl FixedDelayPenalty {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

#[async_trait]
impl PenaltyStrategy for FixedDelayPenalty {
    async fn apply_and_increment(&self) {
        if self.delay.is_zero() {
            return;
        }
        tokio::time::sleep(self.delay).await;
    }

    fn reset(&self) {}
}
