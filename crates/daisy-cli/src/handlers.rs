use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use daisy_core::{HandlerError, Message, MessageHandler, PostProcessAction};
use serde::{Deserialize, Serialize};

pub const GREETING_TYPE: &str = "greeting";

#[derive(Debug, Serialize, Deserialize)]
pub struct Greeting {
    pub message: String,
    #[serde(default)]
    pub seq: u64,
}

/// Decodes the body and deletes the message.
///
/// With `fail_every = n`, every n-th message fails on its first delivery and
/// only succeeds once the queue hands it out again.
pub struct GreetingHandler {
    fail_every: Option<u64>,
    failed_once: Mutex<HashSet<String>>,
}

impl GreetingHandler {
    pub fn new(fail_every: Option<u64>) -> Self {
        Self {
            fail_every: fail_every.filter(|n| *n > 0),
            failed_once: Mutex::new(HashSet::new()),
        }
    }
}

#[async_trait]
impl MessageHandler for GreetingHandler {
    async fn process(&self, message: &Message) -> Result<PostProcessAction, HandlerError> {
        let greeting: Greeting = serde_json::from_str(&message.body)?;
        tracing::debug!(message_id = %message.message_id, greeting = %greeting.message, "greeting received");

        if let Some(n) = self.fail_every
            && greeting.seq % n == 0
        {
            let mut failed_once = self
                .failed_once
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if failed_once.insert(message.message_id.clone()) {
                return Err(HandlerError::new(format!(
                    "intentional failure (seq={})",
                    greeting.seq
                )));
            }
        }
        Ok(PostProcessAction::Delete)
    }
}
