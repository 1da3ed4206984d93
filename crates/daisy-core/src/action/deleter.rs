use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::DeleteResult;
use crate::ports::{EventKind, Observer, QueueTransport};

#[async_trait]
pub trait MessageDeleting: Send + Sync {
    async fn delete(&self, queue_url: &str, receipt_handle: &str) -> DeleteResult;
}

pub struct MessageDeleter {
    transport: Arc<dyn QueueTransport>,
    observer: Arc<dyn Observer>,
}

impl MessageDeleter {
    pub fn new(transport: Arc<dyn QueueTransport>, observer: Arc<dyn Observer>) -> Self {
        Self {
            transport,
            observer,
        }
    }
}

#[async_trait]
impl MessageDeleting for MessageDeleter {
    async fn delete(&self, queue_url: &str, receipt_handle: &str) -> DeleteResult {
        if let Err(err) = self.transport.delete(queue_url, receipt_handle).await {
            return DeleteResult::Failure(err);
        }
        self.observer.increment_queue(EventKind::Deleted, queue_url);
        DeleteResult::Success
    }
}
