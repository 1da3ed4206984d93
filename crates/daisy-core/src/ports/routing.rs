//! MessageRouting port - message to handler resolution.

use std::sync::Arc;

use crate::domain::Message;
use crate::ports::MessageHandler;

/// Picks the handler for a message, or `None` when nothing should handle it.
///
/// Synchronous and side-effect free apart from logging.
pub trait MessageRouting: Send + Sync {
    fn route(&self, message: &Message) -> Option<Arc<dyn MessageHandler>>;
}
