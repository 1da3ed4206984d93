//! Settings file (JSON) for the engine.
//!
//! Durations are whole milliseconds. Every field except the queue url has a
//! default, so the smallest useful file is:
//!
//! ```json
//! { "queues": [{ "url": "orders" }] }
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{
    DEFAULT_BATCH_SIZE, DEFAULT_EMPTY_POLL_MAX, DEFAULT_EXCEPTION_MAX, DEFAULT_WAIT_TIME,
    EngineConfig, PenaltiesConfig, ProcessingConfig, QueueDescriptor,
};
use crate::error::ConfigError;
use crate::penalty::{DEFAULT_BACKOFF_STEP, PenaltyConfig};
use crate::ports::{MessageRouting, Observer, QueueTransport};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PenaltySettings {
    None,
    Fixed {
        delay_ms: u64,
    },
    Backoff {
        max_ms: u64,
        #[serde(default = "default_step_ms")]
        step_ms: u64,
    },
}

impl PenaltySettings {
    fn backoff(max: Duration) -> Self {
        Self::Backoff {
            max_ms: max.as_millis() as u64,
            step_ms: default_step_ms(),
        }
    }

    pub fn to_config(&self) -> PenaltyConfig {
        match *self {
            PenaltySettings::None => PenaltyConfig::NoPenalty,
            PenaltySettings::Fixed { delay_ms } => {
                PenaltyConfig::FixedDelay(Duration::from_millis(delay_ms))
            }
            PenaltySettings::Backoff { max_ms, step_ms } => PenaltyConfig::BackoffDelay {
                max: Duration::from_millis(max_ms),
                step: Duration::from_millis(step_ms),
            },
        }
    }
}

fn default_step_ms() -> u64 {
    DEFAULT_BACKOFF_STEP.as_millis() as u64
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSettings {
    pub url: String,
    #[serde(default = "default_wait_time_ms")]
    pub wait_time_ms: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_empty_poll_penalty")]
    pub empty_poll_penalty: PenaltySettings,
    #[serde(default = "default_poller_count")]
    pub poller_count: usize,
}

fn default_wait_time_ms() -> u64 {
    DEFAULT_WAIT_TIME.as_millis() as u64
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_empty_poll_penalty() -> PenaltySettings {
    PenaltySettings::backoff(DEFAULT_EMPTY_POLL_MAX)
}

fn default_poller_count() -> usize {
    1
}

impl QueueSettings {
    pub fn to_descriptor(&self) -> QueueDescriptor {
        QueueDescriptor::new(self.url.clone())
            .with_wait_time(Duration::from_millis(self.wait_time_ms))
            .with_batch_size(self.batch_size)
            .with_empty_poll_penalty(self.empty_poll_penalty.to_config())
            .with_poller_count(self.poller_count)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingSettings {
    /// Defaults to the available parallelism.
    #[serde(default)]
    pub worker_count: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PenaltiesSettings {
    #[serde(default = "default_exception_penalty")]
    pub poll_exception: PenaltySettings,
    #[serde(default = "default_exception_penalty")]
    pub processing_exception: PenaltySettings,
}

fn default_exception_penalty() -> PenaltySettings {
    PenaltySettings::backoff(DEFAULT_EXCEPTION_MAX)
}

impl Default for PenaltiesSettings {
    fn default() -> Self {
        Self {
            poll_exception: default_exception_penalty(),
            processing_exception: default_exception_penalty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    pub queues: Vec<QueueSettings>,
    #[serde(default)]
    pub processing: ProcessingSettings,
    #[serde(default)]
    pub penalties: PenaltiesSettings,
}

impl EngineSettings {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Combine with the collaborators a file cannot describe.
    pub fn into_config(
        self,
        router: Arc<dyn MessageRouting>,
        transport: Arc<dyn QueueTransport>,
        observer: Arc<dyn Observer>,
    ) -> EngineConfig {
        let queues = self.queues.iter().map(QueueSettings::to_descriptor).collect();
        let mut processing = ProcessingConfig::default();
        if let Some(worker_count) = self.processing.worker_count {
            processing = processing.with_worker_count(worker_count);
        }
        EngineConfig::new(queues, router, transport)
            .with_processing(processing)
            .with_penalties(PenaltiesConfig {
                poll_exception: self.penalties.poll_exception.to_config(),
                processing_exception: self.penalties.processing_exception.to_config(),
            })
            .with_observer(observer)
    }
}
