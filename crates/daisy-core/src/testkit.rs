//! Stub transports, penalties and helpers shared by the unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rand::seq::IteratorRandom;

use crate::domain::Message;
use crate::error::TransportError;
use crate::penalty::PenaltyStrategy;
use crate::ports::QueueTransport;

pub const TEST_TYPE_ATTRIBUTE: &str = "test_type_attribute";

/// A message routed to the `"test"` type, with `receipt` as both id and receipt handle.
pub fn make_message(receipt: impl Into<String>) -> Message {
    let receipt = receipt.into();
    Message::new(receipt.clone(), receipt, "{}").with_attribute(TEST_TYPE_ATTRIBUTE, "test")
}

/// Poll `condition` until it holds; panic after `timeout`.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + timeout;
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not met within {timeout:?}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Counts calls and never waits.
#[derive(Debug, Default)]
pub struct RecordingPenalty {
    applied: AtomicUsize,
    resets: AtomicUsize,
}

impl RecordingPenalty {
    pub fn applied(&self) -> usize {
        self.applied.load(Ordering::SeqCst)
    }

    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PenaltyStrategy for RecordingPenalty {
    async fn apply_and_increment(&self) {
        self.applied.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
    }

    fn reset(&self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
    }
}

/// Every call fails.
#[derive(Debug, Default)]
pub struct ThrowingTransport;

#[async_trait]
impl QueueTransport for ThrowingTransport {
    async fn receive(
        &self,
        _queue_url: &str,
        _max_messages: usize,
        _wait_time: Duration,
    ) -> Result<Vec<Message>, TransportError> {
        tokio::task::yield_now().await;
        Err(TransportError::Request("intentional failure".to_string()))
    }

    async fn delete(&self, _queue_url: &str, _receipt_handle: &str) -> Result<(), TransportError> {
        Err(TransportError::Request("intentional failure".to_string()))
    }

    async fn change_visibility(
        &self,
        _queue_url: &str,
        _receipt_handle: &str,
        _visibility_timeout_secs: u32,
    ) -> Result<(), TransportError> {
        Err(TransportError::Request("intentional failure".to_string()))
    }
}

/// Never returns messages; records delete and visibility calls.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    fail: bool,
    deletes: Mutex<Vec<(String, String)>>,
    visibility_changes: Mutex<Vec<(String, String, u32)>>,
}

impl RecordingTransport {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn deletes(&self) -> Vec<(String, String)> {
        self.deletes.lock().unwrap().clone()
    }

    pub fn visibility_changes(&self) -> Vec<(String, String, u32)> {
        self.visibility_changes.lock().unwrap().clone()
    }

    fn outcome(&self) -> Result<(), TransportError> {
        if self.fail {
            Err(TransportError::Request("intentional failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl QueueTransport for RecordingTransport {
    async fn receive(
        &self,
        _queue_url: &str,
        _max_messages: usize,
        _wait_time: Duration,
    ) -> Result<Vec<Message>, TransportError> {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok(Vec::new())
    }

    async fn delete(&self, queue_url: &str, receipt_handle: &str) -> Result<(), TransportError> {
        self.deletes
            .lock()
            .unwrap()
            .push((queue_url.to_string(), receipt_handle.to_string()));
        self.outcome()
    }

    async fn change_visibility(
        &self,
        queue_url: &str,
        receipt_handle: &str,
        visibility_timeout_secs: u32,
    ) -> Result<(), TransportError> {
        self.visibility_changes.lock().unwrap().push((
            queue_url.to_string(),
            receipt_handle.to_string(),
            visibility_timeout_secs,
        ));
        self.outcome()
    }
}

/// Hands out one random undeleted message per receive, so a message keeps
/// coming back until it is deleted (like a queue redelivering it).
#[derive(Debug)]
pub struct StubDeletingTransport {
    messages: HashMap<String, Message>,
    live: Mutex<HashSet<String>>,
    remove_when_seen: bool,
    delete_calls: Mutex<Vec<String>>,
}

impl StubDeletingTransport {
    pub fn new(messages: Vec<Message>) -> Self {
        let live = messages.iter().map(|m| m.receipt_handle.clone()).collect();
        Self {
            messages: messages
                .into_iter()
                .map(|m| (m.receipt_handle.clone(), m))
                .collect(),
            live: Mutex::new(live),
            remove_when_seen: false,
            delete_calls: Mutex::new(Vec::new()),
        }
    }

    /// Hand each message out at most once.
    pub fn removing_when_seen(mut self) -> Self {
        self.remove_when_seen = true;
        self
    }

    pub fn delete_calls(&self) -> Vec<String> {
        self.delete_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueueTransport for StubDeletingTransport {
    async fn receive(
        &self,
        _queue_url: &str,
        _max_messages: usize,
        _wait_time: Duration,
    ) -> Result<Vec<Message>, TransportError> {
        tokio::task::yield_now().await;
        let picked = {
            let mut live = self.live.lock().unwrap();
            let picked = live.iter().choose(&mut rand::thread_rng()).cloned();
            if self.remove_when_seen
                && let Some(receipt) = &picked
            {
                live.remove(receipt);
            }
            picked
        };
        Ok(picked
            .and_then(|receipt| self.messages.get(&receipt).cloned())
            .into_iter()
            .collect())
    }

    async fn delete(&self, _queue_url: &str, receipt_handle: &str) -> Result<(), TransportError> {
        self.delete_calls
            .lock()
            .unwrap()
            .push(receipt_handle.to_string());
        self.live.lock().unwrap().remove(receipt_handle);
        Ok(())
    }

    async fn change_visibility(
        &self,
        _queue_url: &str,
        _receipt_handle: &str,
        _visibility_timeout_secs: u32,
    ) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Drains a fixed list of messages, a batch per receive, then returns nothing.
#[derive(Debug)]
pub struct DrainingTransport {
    messages: Mutex<VecDeque<Message>>,
}

impl DrainingTransport {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages: Mutex::new(messages.into()),
        }
    }
}

#[async_trait]
impl QueueTransport for DrainingTransport {
    async fn receive(
        &self,
        _queue_url: &str,
        max_messages: usize,
        _wait_time: Duration,
    ) -> Result<Vec<Message>, TransportError> {
        let batch: Vec<Message> = {
            let mut messages = self.messages.lock().unwrap();
            let take = max_messages.min(messages.len());
            messages.drain(..take).collect()
        };
        if batch.is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        Ok(batch)
    }

    async fn delete(&self, _queue_url: &str, _receipt_handle: &str) -> Result<(), TransportError> {
        Ok(())
    }

    async fn change_visibility(
        &self,
        _queue_url: &str,
        _receipt_handle: &str,
        _visibility_timeout_secs: u32,
    ) -> Result<(), TransportError> {
        Ok(())
    }
}
