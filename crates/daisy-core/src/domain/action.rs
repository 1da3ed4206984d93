//! What happens to a message after its handler has run.

use std::time::Duration;

use crate::error::TransportError;

/// Returned by a handler to decide the fate of the message it processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostProcessAction {
    /// Leave the message alone; the queue's redrive policy decides.
    DoNothing,

    /// Remove the message from the queue permanently.
    Delete,

    /// Hide the message for `after`, then let it be received again.
    RetryLater { after: Duration },
}

impl PostProcessAction {
    pub fn retry_later(after: Duration) -> Self {
        Self::RetryLater { after }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteResult {
    Success,
    Failure(TransportError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DelayResult {
    Success,
    Failure(TransportError),
}
