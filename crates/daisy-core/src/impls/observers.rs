//! Observer implementations that need no external metrics system.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::ports::{EventKind, Observer};

type CounterKey = (EventKind, Option<String>);

/// Keeps every counter in memory. Handy in tests and demos.
#[derive(Debug, Default)]
pub struct CountingObserver {
    counters: Mutex<HashMap<CounterKey, u64>>,
}

impl CountingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count for one per-queue event.
    pub fn count(&self, kind: EventKind, queue_url: &str) -> u64 {
        self.get(&(kind, Some(queue_url.to_string())))
    }

    /// Sum over every queue, plus the queue-less counter of the same kind.
    pub fn total(&self, kind: EventKind) -> u64 {
        self.counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|(_, value)| *value)
            .sum()
    }

    /// All counters sorted by kind, then queue.
    pub fn snapshot(&self) -> Vec<(EventKind, Option<String>, u64)> {
        let counters = self
            .counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut entries: Vec<_> = counters
            .iter()
            .map(|((kind, queue), value)| (*kind, queue.clone(), *value))
            .collect();
        entries.sort();
        entries
    }

    fn get(&self, key: &CounterKey) -> u64 {
        self.counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .copied()
            .unwrap_or(0)
    }
}

impl Observer for CountingObserver {
    fn increment(&self, kind: EventKind, queue_url: Option<&str>, count: u64) {
        let mut counters = self
            .counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *counters
            .entry((kind, queue_url.map(str::to_string)))
            .or_insert(0) += count;
    }
}

/// Emits one `trace` event per increment.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn increment(&self, kind: EventKind, queue_url: Option<&str>, count: u64) {
        tracing::trace!(
            metric = kind.metric_name(),
            queue = queue_url.unwrap_or("-"),
            count,
            "counter incremented"
        );
    }
}
