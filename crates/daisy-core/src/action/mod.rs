//! Post-processing actions against the originating queue.
//!
//! Both actions issue exactly one transport call and report the outcome as a
//! result value. Neither retries.

mod delayer;
mod deleter;

pub use delayer::{MAX_VISIBILITY_TIMEOUT, MessageDelayer, MessageDelaying};
pub use deleter::{MessageDeleter, MessageDeleting};
