//! Work sampling: fair fan-in from every producer channel into one stream.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::select_all;
use rand::seq::SliceRandom;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::supervised::LoopTask;
use crate::domain::Work;
use crate::error::DaisyError;

/// Takes one work item from whichever input has one ready.
#[async_trait]
pub trait WorkSampling: Send + Sync {
    async fn sample(&self, inputs: &mut [mpsc::Receiver<Work>]) -> Result<Work, DaisyError>;
}

/// Picks uniformly at random among the inputs that are ready.
///
/// The inputs are shuffled before every wait and `select_all` resolves to the
/// first ready input in that order, so no input has a fixed priority over
/// another. Closed, drained inputs are skipped; only when every input is
/// closed does sampling fail.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomWorkSampler;

#[async_trait]
impl WorkSampling for RandomWorkSampler {
    async fn sample(&self, inputs: &mut [mpsc::Receiver<Work>]) -> Result<Work, DaisyError> {
        loop {
            let mut open: Vec<&mut mpsc::Receiver<Work>> = inputs
                .iter_mut()
                .filter(|rx| !(rx.is_closed() && rx.is_empty()))
                .collect();
            if open.is_empty() {
                return Err(DaisyError::InputsClosed);
            }
            open.shuffle(&mut rand::thread_rng());

            let (received, _, _) = select_all(open.into_iter().map(|rx| Box::pin(rx.recv()))).await;
            if let Some(work) = received {
                return Ok(work);
            }
        }
    }
}

/// The single fan-in loop of an engine.
///
/// A sampler failure cancels the whole engine: without fan-in no message
/// can reach a worker.
pub struct SamplerLoop {
    sampler: Arc<dyn WorkSampling>,
    inputs: Vec<mpsc::Receiver<Work>>,
    output: mpsc::Sender<Work>,
    scope: CancellationToken,
}

impl SamplerLoop {
    pub fn new(
        sampler: Arc<dyn WorkSampling>,
        inputs: Vec<mpsc::Receiver<Work>>,
        output: mpsc::Sender<Work>,
        scope: CancellationToken,
    ) -> Self {
        Self {
            sampler,
            inputs,
            output,
            scope,
        }
    }
}

#[async_trait]
impl LoopTask for SamplerLoop {
    async fn run_once(&mut self) -> Result<(), DaisyError> {
        let work = self.sampler.sample(&mut self.inputs).await?;
        self.output
            .send(work)
            .await
            .map_err(|_| DaisyError::ChannelClosed)
    }

    fn on_error(&mut self, error: &DaisyError) {
        tracing::error!(error = %error, "exception in sampler, cancelling engine");
        self.scope.cancel();
    }
}
