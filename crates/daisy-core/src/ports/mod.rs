//! Ports - 外部システムとの境界
//!
//! Each trait here is a seam to something the engine does not own: the
//! queue service, user handlers, the routing policy and the metrics sink.

pub mod handler;
pub mod observer;
pub mod routing;
pub mod transport;

pub use self::handler::MessageHandler;
pub use self::observer::{EventKind, NoopObserver, Observer};
pub use self::routing::MessageRouting;
pub use self::transport::QueueTransport;
