//! Impls - 実装（開発用・テスト用）
//!
//! Implementations of the ports that need nothing outside the process:
//! - **InMemoryQueueTransport**: a queue with visibility timeouts
//! - **CountingObserver** / **TracingObserver**: counters without a metrics backend

pub mod inmem_transport;
pub mod observers;

pub use self::inmem_transport::{DEFAULT_VISIBILITY_TIMEOUT, InMemoryQueueTransport};
pub use self::observers::{CountingObserver, TracingObserver};
