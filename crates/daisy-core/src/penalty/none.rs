use async_trait::async_trait;

use super::PenaltyStrategy;

/// Never waits.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPenalty;

#[async_trait]
impl PenaltyStrategy for NoPenalty {
    async fn apply_and_increment(&self) {}

    fn reset(&self) {}
}
