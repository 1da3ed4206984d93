use super::Message;
use crate::error::TransportError;

/// Result of one receive attempt. An empty `Success` means the queue had
/// nothing to hand out, which is not an error.
#[derive(Debug)]
pub enum PollResult {
    Success(Vec<Message>),
    Failure(TransportError),
}
