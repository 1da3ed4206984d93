//! daisy-core
//!
//! A concurrent consumer engine for pull-based message queues: it polls
//! several queues, fans their messages into one worker pool, dispatches each
//! message to a handler by a type attribute and deletes or delays it
//! according to the handler's answer.
//!
//! # モジュール構成
//! - **domain**: plain data (Message, Work, PollResult, PostProcessAction)
//! - **ports**: seams to the outside (QueueTransport, MessageHandler, MessageRouting, Observer)
//! - **penalty**: delay policies after failures and empty polls
//! - **poller** / **action**: the three transport calls (receive, delete, change visibility)
//! - **router**: handler lookup by message type attribute
//! - **app**: supervised loops and the engine
//! - **config** / **settings**: programmatic and file configuration
//! - **impls**: in-memory transport and observers for tests and demos

pub mod action;
pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod penalty;
pub mod poller;
pub mod ports;
pub mod router;
pub mod settings;

#[cfg(test)]
mod testkit;

pub use crate::app::{Daisy, EngineHandle, ShutdownReport};
pub use crate::config::{EngineConfig, PenaltiesConfig, ProcessingConfig, QueueDescriptor};
pub use crate::domain::{Message, PostProcessAction, Work};
pub use crate::error::{ConfigError, DaisyError, HandlerError, TransportError};
pub use crate::penalty::{PenaltyConfig, PenaltyStrategy};
pub use crate::ports::{MessageHandler, MessageRouting, Observer, QueueTransport};
pub use crate::router::TypeAttributeRouter;
