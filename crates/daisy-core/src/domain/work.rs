use super::Message;

/// A message in flight inside the engine, tagged with the queue it came from.
///
/// Moved, never cloned, from producer to sampler to worker.
#[derive(Debug)]
pub struct Work {
    pub queue_url: String,
    pub message: Message,
}

impl Work {
    pub fn new(queue_url: impl Into<String>, message: Message) -> Self {
        Self {
            queue_url: queue_url.into(),
            message,
        }
    }
}
