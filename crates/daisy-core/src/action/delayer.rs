use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::DelayResult;
use crate::ports::{EventKind, Observer, QueueTransport};

/// Longest visibility timeout the queue accepts (12 hours, as on SQS).
pub const MAX_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(12 * 60 * 60);

#[async_trait]
pub trait MessageDelaying: Send + Sync {
    async fn delay(&self, queue_url: &str, receipt_handle: &str, duration: Duration)
    -> DelayResult;
}

pub struct MessageDelayer {
    transport: Arc<dyn QueueTransport>,
    observer: Arc<dyn Observer>,
}

impl MessageDelayer {
    pub fn new(transport: Arc<dyn QueueTransport>, observer: Arc<dyn Observer>) -> Self {
        Self {
            transport,
            observer,
        }
    }
}

/// Whole seconds, clamped to [`MAX_VISIBILITY_TIMEOUT`].
fn visibility_timeout_secs(duration: Duration) -> u32 {
    duration.min(MAX_VISIBILITY_TIMEOUT).as_secs() as u32
}

#[async_trait]
impl MessageDelaying for MessageDelayer {
    async fn delay(
        &self,
        queue_url: &str,
        receipt_handle: &str,
        duration: Duration,
    ) -> DelayResult {
        let timeout_secs = visibility_timeout_secs(duration);
        if let Err(err) = self
            .transport
            .change_visibility(queue_url, receipt_handle, timeout_secs)
            .await
        {
            return DelayResult::Failure(err);
        }
        self.observer.increment_queue(EventKind::Delayed, queue_url);
        DelayResult::Success
    }
}
