//! ProducerLoop - poll one queue into a bounded channel.
//!
//! The channel holds at most one batch. When workers fall behind the send
//! blocks and the producer stops polling, which is the engine's backpressure.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::supervised::LoopTask;
use crate::domain::{PollResult, Work};
use crate::error::DaisyError;
use crate::penalty::PenaltyStrategy;
use crate::poller::QueuePolling;

pub struct ProducerLoop {
    poller: Arc<dyn QueuePolling>,
    empty_poll_penalty: Arc<dyn PenaltyStrategy>,
    output: mpsc::Sender<Work>,
}

impl ProducerLoop {
    pub fn new(
        poller: Arc<dyn QueuePolling>,
        empty_poll_penalty: Arc<dyn PenaltyStrategy>,
        output: mpsc::Sender<Work>,
    ) -> Self {
        Self {
            poller,
            empty_poll_penalty,
            output,
        }
    }

    /// A producer's channel, sized to one batch of its poller.
    pub fn channel(poller: &dyn QueuePolling) -> (mpsc::Sender<Work>, mpsc::Receiver<Work>) {
        mpsc::channel(poller.batch_size().max(1))
    }
}

#[async_trait]
impl LoopTask for ProducerLoop {
    async fn run_once(&mut self) -> Result<(), DaisyError> {
        let queue_url = self.poller.queue_url();
        let messages = match self.poller.poll().await {
            PollResult::Success(messages) => messages,
            PollResult::Failure(source) => {
                return Err(DaisyError::Poll {
                    queue_url: queue_url.to_string(),
                    source,
                });
            }
        };
        tracing::debug!(count = messages.len(), "fetched messages");

        if messages.is_empty() {
            self.empty_poll_penalty.apply_and_increment().await;
            return Ok(());
        }
        self.empty_poll_penalty.reset();

        // Messages still in `messages` when cancellation drops this future are lost
        // to the engine; the queue redelivers them after their visibility timeout.
        for message in messages {
            self.output
                .send(Work::new(queue_url, message))
                .await
                .map_err(|_| DaisyError::ChannelClosed)?;
        }
        Ok(())
    }

    fn on_error(&mut self, error: &DaisyError) {
        tracing::error!(error = %error, "error in message receiver");
    }
}
