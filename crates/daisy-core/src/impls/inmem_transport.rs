//! InMemoryQueueTransport - 開発用のキュー
//!
//! Behaves like a small SQS: received messages stay in flight for a
//! visibility timeout and come back with a fresh receipt handle if nobody
//! deletes them in time.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;
use ulid::Ulid;

use crate::domain::Message;
use crate::error::TransportError;
use crate::ports::{EventKind, NoopObserver, Observer, QueueTransport};

pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
struct StoredMessage {
    message_id: String,
    body: String,
    attributes: HashMap<String, String>,
}

#[derive(Debug)]
struct InFlight {
    stored: StoredMessage,
    visible_at: Instant,
}

enum Attempt {
    Batch(Vec<Message>),
    Empty { next_expiry: Option<Instant> },
}

#[derive(Debug, Default)]
struct QueueState {
    visible: VecDeque<StoredMessage>,
    /// Keyed by the receipt handle issued on the last receive.
    in_flight: HashMap<String, InFlight>,
}

impl QueueState {
    /// Move messages whose visibility timeout has passed back to the visible queue.
    fn promote_expired(&mut self, now: Instant) {
        let expired: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, entry)| entry.visible_at <= now)
            .map(|(receipt, _)| receipt.clone())
            .collect();
        for receipt in expired {
            if let Some(entry) = self.in_flight.remove(&receipt) {
                self.visible.push_back(entry.stored);
            }
        }
    }

    fn next_expiry(&self) -> Option<Instant> {
        self.in_flight.values().map(|entry| entry.visible_at).min()
    }
}

/// In-memory [`QueueTransport`] with named queues.
///
/// # 実装詳細
/// - std `Mutex` around all queues; never held across an `.await`
/// - `Notify` wakes long-polling receivers on send and on visibility changes
pub struct InMemoryQueueTransport {
    queues: Mutex<HashMap<String, QueueState>>,
    notify: Notify,
    visibility_timeout: Duration,
    observer: Arc<dyn Observer>,
}

impl InMemoryQueueTransport {
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            notify: Notify::new(),
            visibility_timeout: DEFAULT_VISIBILITY_TIMEOUT,
            observer: Arc::new(NoopObserver),
        }
    }

    /// Visibility timeout applied to every received message.
    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    /// Observer that receives a `generated` increment per sent message.
    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    pub fn create_queue(&self, queue_url: impl Into<String>) {
        self.lock().entry(queue_url.into()).or_default();
    }

    /// Enqueue a message and return its id.
    pub async fn send(
        &self,
        queue_url: &str,
        body: impl Into<String>,
        attributes: HashMap<String, String>,
    ) -> Result<String, TransportError> {
        let message_id = Ulid::new().to_string();
        {
            let mut queues = self.lock();
            let queue = queues
                .get_mut(queue_url)
                .ok_or_else(|| TransportError::QueueNotFound(queue_url.to_string()))?;
            queue.visible.push_back(StoredMessage {
                message_id: message_id.clone(),
                body: body.into(),
                attributes,
            });
        }
        self.observer.increment_queue(EventKind::Generated, queue_url);
        self.notify.notify_waiters();
        Ok(message_id)
    }

    /// Messages that a receive could hand out right now.
    pub fn visible_len(&self, queue_url: &str) -> usize {
        let now = Instant::now();
        let mut queues = self.lock();
        queues
            .get_mut(queue_url)
            .map(|queue| {
                queue.promote_expired(now);
                queue.visible.len()
            })
            .unwrap_or(0)
    }

    /// Received messages that have been neither deleted nor made visible again.
    pub fn in_flight_len(&self, queue_url: &str) -> usize {
        let now = Instant::now();
        let mut queues = self.lock();
        queues
            .get_mut(queue_url)
            .map(|queue| {
                queue.promote_expired(now);
                queue.in_flight.len()
            })
            .unwrap_or(0)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, QueueState>> {
        // A poisoned lock only means another thread panicked mid-update;
        // the map itself is still usable.
        self.queues.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Take up to `max_messages` visible messages, or report when to look again.
    fn try_receive(&self, queue_url: &str, max_messages: usize) -> Result<Attempt, TransportError> {
        let now = Instant::now();
        let mut queues = self.lock();
        let queue = queues
            .get_mut(queue_url)
            .ok_or_else(|| TransportError::QueueNotFound(queue_url.to_string()))?;
        queue.promote_expired(now);

        if queue.visible.is_empty() {
            return Ok(Attempt::Empty {
                next_expiry: queue.next_expiry(),
            });
        }

        let take = max_messages.min(queue.visible.len());
        let mut batch = Vec::with_capacity(take);
        for stored in queue.visible.drain(..take) {
            let receipt_handle = Ulid::new().to_string();
            let mut message = Message::new(
                stored.message_id.clone(),
                receipt_handle.clone(),
                stored.body.clone(),
            );
            message.attributes = stored.attributes.clone();
            queue.in_flight.insert(
                receipt_handle,
                InFlight {
                    stored,
                    visible_at: now + self.visibility_timeout,
                },
            );
            batch.push(message);
        }
        Ok(Attempt::Batch(batch))
    }
}

impl Default for InMemoryQueueTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueTransport for InMemoryQueueTransport {
    async fn receive(
        &self,
        queue_url: &str,
        max_messages: usize,
        wait_time: Duration,
    ) -> Result<Vec<Message>, TransportError> {
        let deadline = Instant::now() + wait_time;
        loop {
            // Register interest before checking, so a send between the check
            // and the wait is not missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next_expiry = match self.try_receive(queue_url, max_messages)? {
                Attempt::Batch(batch) => return Ok(batch),
                Attempt::Empty { next_expiry } => next_expiry,
            };

            if Instant::now() >= deadline {
                return Ok(Vec::new());
            }
            let wake_at = next_expiry.map_or(deadline, |expiry| expiry.min(deadline));

            tokio::select! {
                _ = &mut notified => {},
                _ = tokio::time::sleep_until(wake_at) => {},
            }
        }
    }

    async fn delete(&self, queue_url: &str, receipt_handle: &str) -> Result<(), TransportError> {
        let mut queues = self.lock();
        let queue = queues
            .get_mut(queue_url)
            .ok_or_else(|| TransportError::QueueNotFound(queue_url.to_string()))?;
        queue
            .in_flight
            .remove(receipt_handle)
            .map(|_| ())
            .ok_or_else(|| TransportError::InvalidReceipt(receipt_handle.to_string()))
    }

    async fn change_visibility(
        &self,
        queue_url: &str,
        receipt_handle: &str,
        visibility_timeout_secs: u32,
    ) -> Result<(), TransportError> {
        {
            let mut queues = self.lock();
            let queue = queues
                .get_mut(queue_url)
                .ok_or_else(|| TransportError::QueueNotFound(queue_url.to_string()))?;
            let entry = queue
                .in_flight
                .get_mut(receipt_handle)
                .ok_or_else(|| TransportError::InvalidReceipt(receipt_handle.to_string()))?;
            entry.visible_at =
                Instant::now() + Duration::from_secs(u64::from(visibility_timeout_secs));
        }
        self.notify.notify_waiters();
        Ok(())
    }
}
