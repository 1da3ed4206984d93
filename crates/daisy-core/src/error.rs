use thiserror::Error;

/// Failure reported by a queue transport call (receive / delete / change visibility).
///
/// Every variant is treated as retryable by the engine; the owning supervised
/// loop logs it and applies its penalty.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("queue not found: {0}")]
    QueueNotFound(String),

    #[error("receipt handle not recognised: {0}")]
    InvalidReceipt(String),

    #[error("transport request failed: {0}")]
    Request(String),
}

/// Failure raised by a message handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),

    #[error("body decode: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Failure of one supervised loop iteration.
#[derive(Debug, Error)]
pub enum DaisyError {
    #[error("poll failed for queue={queue_url}: {source}")]
    Poll {
        queue_url: String,
        #[source]
        source: TransportError,
    },

    #[error("handler failed for message={message_id}: {source}")]
    Handler {
        message_id: String,
        #[source]
        source: HandlerError,
    },

    #[error("all sampler inputs are closed")]
    InputsClosed,

    #[error("work channel closed")]
    ChannelClosed,
}

/// Invalid engine configuration, detected before anything is spawned.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("at least one queue must be configured")]
    NoQueues,

    #[error("queue url must not be empty")]
    EmptyQueueUrl,

    #[error("batch size must be at least 1 for queue={0}")]
    ZeroBatchSize(String),

    #[error("worker count must be at least 1")]
    ZeroWorkers,

    #[error("settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings parse: {0}")]
    Parse(#[from] serde_json::Error),
}
