//! Engine configuration - 起動時検証（Fail-fast）
//!
//! Everything the engine needs is collected here and validated once, in
//! [`crate::Daisy::new`], before any loop is spawned.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;

use crate::error::ConfigError;
use crate::penalty::PenaltyConfig;
use crate::ports::{MessageRouting, NoopObserver, Observer, QueueTransport};

pub const DEFAULT_WAIT_TIME: Duration = Duration::from_secs(20);
pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_EMPTY_POLL_MAX: Duration = Duration::from_secs(10);
pub const DEFAULT_EXCEPTION_MAX: Duration = Duration::from_secs(60);

/// One queue to consume, and how.
#[derive(Debug, Clone)]
pub struct QueueDescriptor {
    pub url: String,
    /// Long-poll wait of a single receive call.
    pub wait_time: Duration,
    pub batch_size: usize,
    pub empty_poll_penalty: PenaltyConfig,
    /// Number of producer loops polling this queue, at least 1.
    pub poller_count: usize,
}

impl QueueDescriptor {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            wait_time: DEFAULT_WAIT_TIME,
            batch_size: DEFAULT_BATCH_SIZE,
            empty_poll_penalty: PenaltyConfig::backoff(DEFAULT_EMPTY_POLL_MAX),
            poller_count: 1,
        }
    }

    pub fn with_wait_time(mut self, wait_time: Duration) -> Self {
        self.wait_time = wait_time;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_empty_poll_penalty(mut self, penalty: PenaltyConfig) -> Self {
        self.empty_poll_penalty = penalty;
        self
    }

    pub fn with_poller_count(mut self, poller_count: usize) -> Self {
        self.poller_count = poller_count.max(1);
        self
    }
}

#[derive(Debug, Clone)]
pub struct ProcessingConfig {
    pub worker_count: usize,
    /// Runtime the loops are spawned on. `None` means the runtime that calls `run`.
    pub runtime: Option<Handle>,
}

impl ProcessingConfig {
    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            runtime: None,
        }
    }
}

fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Penalties applied after a failed iteration.
#[derive(Debug, Clone)]
pub struct PenaltiesConfig {
    pub poll_exception: PenaltyConfig,
    pub processing_exception: PenaltyConfig,
}

impl Default for PenaltiesConfig {
    fn default() -> Self {
        Self {
            poll_exception: PenaltyConfig::backoff(DEFAULT_EXCEPTION_MAX),
            processing_exception: PenaltyConfig::backoff(DEFAULT_EXCEPTION_MAX),
        }
    }
}

/// Full engine configuration.
///
/// # 使用例
/// ```ignore
/// let config = EngineConfig::new(vec![QueueDescriptor::new(url)], router, transport)
///     .with_observer(observer)
///     .with_processing(ProcessingConfig::default().with_worker_count(4));
/// let handle = Daisy::new(config)?.run();
/// ```
#[derive(Clone)]
pub struct EngineConfig {
    pub queues: Vec<QueueDescriptor>,
    pub processing: ProcessingConfig,
    pub penalties: PenaltiesConfig,
    pub router: Arc<dyn MessageRouting>,
    pub transport: Arc<dyn QueueTransport>,
    pub observer: Arc<dyn Observer>,
}

impl EngineConfig {
    pub fn new(
        queues: Vec<QueueDescriptor>,
        router: Arc<dyn MessageRouting>,
        transport: Arc<dyn QueueTransport>,
    ) -> Self {
        Self {
            queues,
            processing: ProcessingConfig::default(),
            penalties: PenaltiesConfig::default(),
            router,
            transport,
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_processing(mut self, processing: ProcessingConfig) -> Self {
        self.processing = processing;
        self
    }

    pub fn with_penalties(mut self, penalties: PenaltiesConfig) -> Self {
        self.penalties = penalties;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queues.is_empty() {
            return Err(ConfigError::NoQueues);
        }
        for queue in &self.queues {
            if queue.url.trim().is_empty() {
                return Err(ConfigError::EmptyQueueUrl);
            }
            if queue.batch_size == 0 {
                return Err(ConfigError::ZeroBatchSize(queue.url.clone()));
            }
        }
        if self.processing.worker_count == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        Ok(())
    }
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("queues", &self.queues)
            .field("processing", &self.processing)
            .field("penalties", &self.penalties)
            .finish_non_exhaustive()
    }
}
