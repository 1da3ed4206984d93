//! A transport that never runs dry: every receive returns a full batch.

use std::time::Duration;

use async_trait::async_trait;
use daisy_core::{Message, QueueTransport, TransportError};
use ulid::Ulid;

/// Copies of one template message, each with fresh ids.
pub struct InfiniteTransport {
    template: Message,
    latency: Duration,
}

impl InfiniteTransport {
    pub fn new(template: Message) -> Self {
        Self {
            template,
            latency: Duration::ZERO,
        }
    }

    /// Simulated round trip of every receive.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

#[async_trait]
impl QueueTransport for InfiniteTransport {
    async fn receive(
        &self,
        _queue_url: &str,
        max_messages: usize,
        _wait_time: Duration,
    ) -> Result<Vec<Message>, TransportError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok((0..max_messages)
            .map(|_| Message {
                message_id: Ulid::new().to_string(),
                receipt_handle: Ulid::new().to_string(),
                ..self.template.clone()
            })
            .collect())
    }

    async fn delete(&self, _queue_url: &str, _receipt_handle: &str) -> Result<(), TransportError> {
        Ok(())
    }

    async fn change_visibility(
        &self,
        _queue_url: &str,
        _receipt_handle: &str,
        _visibility_timeout_secs: u32,
    ) -> Result<(), TransportError> {
        Ok(())
    }
}
