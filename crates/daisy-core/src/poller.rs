//! Queue poller: one receive call against one queue.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::PollResult;
use crate::ports::{EventKind, Observer, QueueTransport};

/// A source of message batches for a single queue.
#[async_trait]
pub trait QueuePolling: Send + Sync {
    fn batch_size(&self) -> usize;

    fn queue_url(&self) -> &str;

    /// Never fails outright: transport errors come back as `PollResult::Failure`.
    async fn poll(&self) -> PollResult;
}

/// Polls a queue through a shared [`QueueTransport`].
pub struct QueuePoller {
    queue_url: String,
    batch_size: usize,
    wait_time: Duration,
    transport: Arc<dyn QueueTransport>,
    observer: Arc<dyn Observer>,
}

impl QueuePoller {
    pub fn new(
        queue_url: impl Into<String>,
        batch_size: usize,
        wait_time: Duration,
        transport: Arc<dyn QueueTransport>,
        observer: Arc<dyn Observer>,
    ) -> Self {
        Self {
            queue_url: queue_url.into(),
            batch_size,
            wait_time,
            transport,
            observer,
        }
    }
}

#[async_trait]
impl QueuePolling for QueuePoller {
    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn queue_url(&self) -> &str {
        &self.queue_url
    }

    async fn poll(&self) -> PollResult {
        let messages = match self
            .transport
            .receive(&self.queue_url, self.batch_size, self.wait_time)
            .await
        {
            Ok(messages) => messages,
            Err(err) => return PollResult::Failure(err),
        };

        self.observer.increment(
            EventKind::Polled,
            Some(&self.queue_url),
            messages.len() as u64,
        );
        PollResult::Success(messages)
    }
}
