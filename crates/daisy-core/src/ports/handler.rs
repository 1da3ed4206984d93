//! MessageHandler port - user code that processes one message.

use async_trait::async_trait;

use crate::domain::{Message, PostProcessAction};
use crate::error::HandlerError;

/// Processes one message and says what should happen to it afterwards.
///
/// Called concurrently from several workers with different messages, so
/// implementations must be `Send + Sync`.
///
/// # 使用例
/// ```ignore
/// struct Greeter;
///
/// #[async_trait]
/// impl MessageHandler for Greeter {
///     async fn process(&self, message: &Message) -> Result<PostProcessAction, HandlerError> {
///         println!("hello, {}", message.body);
///         Ok(PostProcessAction::Delete)
///     }
/// }
/// ```
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn process(&self, message: &Message) -> Result<PostProcessAction, HandlerError>;
}
