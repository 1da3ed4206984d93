//! Worker pool: route each work item, run its handler, apply the action.
//!
//! # 処理の流れ
//! 1. take one [`Work`] from the shared channel
//! 2. route it; a miss is counted as failed and dropped
//! 3. run the handler (panics become [`HandlerError::Panicked`])
//! 4. apply the returned [`PostProcessAction`]
//! 5. count processed, per queue and in total

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::{Mutex, mpsc};

use super::supervised::LoopTask;
use crate::action::{MessageDelaying, MessageDeleting};
use crate::domain::{DelayResult, DeleteResult, PostProcessAction, Work};
use crate::error::{DaisyError, HandlerError};
use crate::ports::{EventKind, MessageRouting, Observer};

/// Handles one work item end to end.
#[async_trait]
pub trait WorkProcessing: Send + Sync {
    async fn process(&self, work: Work) -> Result<(), DaisyError>;
}

pub struct RoutingWorkProcessor {
    router: Arc<dyn MessageRouting>,
    deleter: Arc<dyn MessageDeleting>,
    delayer: Arc<dyn MessageDelaying>,
    observer: Arc<dyn Observer>,
}

impl RoutingWorkProcessor {
    pub fn new(
        router: Arc<dyn MessageRouting>,
        deleter: Arc<dyn MessageDeleting>,
        delayer: Arc<dyn MessageDelaying>,
        observer: Arc<dyn Observer>,
    ) -> Self {
        Self {
            router,
            deleter,
            delayer,
            observer,
        }
    }

    async fn apply(&self, work: &Work, action: PostProcessAction) {
        let receipt = &work.message.receipt_handle;
        match action {
            PostProcessAction::DoNothing => {}
            PostProcessAction::Delete => {
                if let DeleteResult::Failure(error) = self.deleter.delete(&work.queue_url, receipt).await {
                    tracing::warn!(
                        message_id = %work.message.message_id,
                        error = %error,
                        "failed to delete message"
                    );
                }
            }
            PostProcessAction::RetryLater { after } => {
                if let DelayResult::Failure(error) =
                    self.delayer.delay(&work.queue_url, receipt, after).await
                {
                    tracing::warn!(
                        message_id = %work.message.message_id,
                        error = %error,
                        "failed to delay message"
                    );
                }
            }
        }
    }
}

#[async_trait]
impl WorkProcessing for RoutingWorkProcessor {
    async fn process(&self, work: Work) -> Result<(), DaisyError> {
        let Some(handler) = self.router.route(&work.message) else {
            self.observer.increment_queue(EventKind::Failed, &work.queue_url);
            return Ok(());
        };
        tracing::debug!(message_id = %work.message.message_id, "routed message");

        let outcome = AssertUnwindSafe(handler.process(&work.message))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(HandlerError::Panicked(panic_message(panic.as_ref()))));
        let action = match outcome {
            Ok(action) => action,
            Err(source) => {
                self.observer.increment_queue(EventKind::Failed, &work.queue_url);
                return Err(DaisyError::Handler {
                    message_id: work.message.message_id.clone(),
                    source,
                });
            }
        };

        self.apply(&work, action).await;

        self.observer.increment_queue(EventKind::Processed, &work.queue_url);
        self.observer.increment(EventKind::ProcessedTotal, None, 1);
        Ok(())
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Receiving half of the work channel, shared by every worker.
pub type SharedWorkReceiver = Arc<Mutex<mpsc::Receiver<Work>>>;

/// One worker of the pool.
pub struct WorkerLoop {
    input: SharedWorkReceiver,
    processor: Arc<dyn WorkProcessing>,
}

impl WorkerLoop {
    pub fn new(input: SharedWorkReceiver, processor: Arc<dyn WorkProcessing>) -> Self {
        Self { input, processor }
    }
}

#[async_trait]
impl LoopTask for WorkerLoop {
    async fn run_once(&mut self) -> Result<(), DaisyError> {
        // The lock is held only while waiting for the next item, not while processing it.
        let work = {
            let mut input = self.input.lock().await;
            input.recv().await.ok_or(DaisyError::ChannelClosed)?
        };
        self.processor.process(work).await
    }

    fn on_error(&mut self, error: &DaisyError) {
        tracing::error!(error = %error, "exception logged in processor pipeline");
    }
}
