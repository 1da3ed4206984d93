//! QueueTransport port - the external queue service.
//!
//! The engine never stores messages itself; everything it knows about a
//! message's lifecycle goes through these three calls.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::Message;
use crate::error::TransportError;

/// Narrow receive / delete / change-visibility contract against a remote queue.
///
/// # Thread Safety
/// - Shared as `Arc<dyn QueueTransport>` by every poller and action.
/// - Calls are independent request/response exchanges, so no locking is
///   expected on the caller's side.
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Receive up to `max_messages`, waiting up to `wait_time` for at least one.
    async fn receive(
        &self,
        queue_url: &str,
        max_messages: usize,
        wait_time: Duration,
    ) -> Result<Vec<Message>, TransportError>;

    async fn delete(&self, queue_url: &str, receipt_handle: &str) -> Result<(), TransportError>;

    /// Hide a received message for `visibility_timeout_secs` from now.
    async fn change_visibility(
        &self,
        queue_url: &str,
        receipt_handle: &str,
        visibility_timeout_secs: u32,
    ) -> Result<(), TransportError>;
}
