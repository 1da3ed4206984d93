//! Domain model: messages, work items and the sum-type results passed
//! between the engine's components.

pub mod action;
pub mod message;
pub mod poll;
pub mod work;

pub use action::{DelayResult, DeleteResult, PostProcessAction};
pub use message::Message;
pub use poll::PollResult;
pub use work::Work;
