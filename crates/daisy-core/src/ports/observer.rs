//! Observer port - event counters.
//!
//! The engine only counts things. Where the counts go (Prometheus, logs,
//! nowhere) is up to the implementation.

use std::fmt;

/// Kinds of events the engine counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    Polled,
    Generated,
    Processed,
    ProcessedTotal,
    Deleted,
    Delayed,
    Failed,
}

impl EventKind {
    pub fn metric_name(self) -> &'static str {
        match self {
            EventKind::Polled => "messages.polled",
            EventKind::Generated => "messages.generated",
            EventKind::Processed => "messages.processed",
            EventKind::ProcessedTotal => "messages.processed.total",
            EventKind::Deleted => "messages.deleted",
            EventKind::Delayed => "messages.delayed",
            EventKind::Failed => "messages.failed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.metric_name())
    }
}

/// Receives counter increments keyed by event kind and, for per-queue
/// events, the queue url.
pub trait Observer: Send + Sync {
    fn increment(&self, kind: EventKind, queue_url: Option<&str>, count: u64);

    fn increment_queue(&self, kind: EventKind, queue_url: &str) {
        self.increment(kind, Some(queue_url), 1);
    }
}

/// Discards every increment.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl Observer for NoopObserver {
    fn increment(&self, _kind: EventKind, _queue_url: Option<&str>, _count: u64) {}
}
