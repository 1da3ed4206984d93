//! Penalty strategies: how long a loop sits out after a failure or an
//! unproductive poll.
//!
//! Three independent penalties exist per engine:
//! - poll exceptions (per producer loop)
//! - processing exceptions (per worker loop)
//! - empty polls (per producer, configured on the queue)

mod backoff;
mod fixed;
mod none;

pub use backoff::{BackoffDelayPenalty, DEFAULT_BACKOFF_STEP, MAX_BACKOFF};
pub use fixed::FixedDelayPenalty;
pub use none::NoPenalty;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

/// A delay policy driven by a failure counter.
///
/// `apply_and_increment` suspends the caller for the current penalty and then
/// counts one more failure; `reset` forgets all counted failures.
#[async_trait]
pub trait PenaltyStrategy: Send + Sync {
    async fn apply_and_increment(&self);

    fn reset(&self);
}

/// Declarative penalty choice, turned into a fresh strategy per loop.
#[derive(Clone)]
pub enum PenaltyConfig {
    NoPenalty,
    FixedDelay(Duration),
    BackoffDelay { max: Duration, step: Duration },
    /// Caller-supplied strategy. The same instance is shared by every loop
    /// it is configured for.
    Custom(Arc<dyn PenaltyStrategy>),
}

impl PenaltyConfig {
    /// Exponential backoff with the default 100ms step.
    pub fn backoff(max: Duration) -> Self {
        Self::BackoffDelay {
            max,
            step: DEFAULT_BACKOFF_STEP,
        }
    }

    pub fn custom(strategy: Arc<dyn PenaltyStrategy>) -> Self {
        Self::Custom(strategy)
    }

    pub fn make_penalty(&self) -> Arc<dyn PenaltyStrategy> {
        match self {
            PenaltyConfig::NoPenalty => Arc::new(NoPenalty),
            PenaltyConfig::FixedDelay(delay) => Arc::new(FixedDelayPenalty::new(*delay)),
            PenaltyConfig::BackoffDelay { max, step } => {
                Arc::new(BackoffDelayPenalty::new(*max, *step))
            }
            PenaltyConfig::Custom(strategy) => Arc::clone(strategy),
        }
    }
}

impl fmt::Debug for PenaltyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PenaltyConfig::NoPenalty => f.write_str("NoPenalty"),
            PenaltyConfig::FixedDelay(delay) => f.debug_tuple("FixedDelay").field(delay).finish(),
            PenaltyConfig::BackoffDelay { max, step } => f
                .debug_struct("BackoffDelay")
                .field("max", max)
                .field("step", step)
                .finish(),
            PenaltyConfig::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
