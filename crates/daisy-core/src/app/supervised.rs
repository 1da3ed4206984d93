//! SupervisedLoop - retry-until-cancelled execution of one task body.
//!
//! Every concurrent piece of the engine (producers, the sampler, workers)
//! runs inside one of these.
//!
//! # フロー
//! 1. stop if the scope is cancelled
//! 2. run the body, racing it against cancellation
//! 3. success: reset the penalty
//! 4. failure: hand the error to the task, then apply the penalty
//!    (also raced against cancellation)
//! 5. optionally yield, then go again

use std::sync::Arc;

use async_trait::async_trait;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span};

use crate::error::DaisyError;
use crate::penalty::PenaltyStrategy;

/// The body of a supervised loop.
#[async_trait]
pub trait LoopTask: Send + 'static {
    /// One iteration. Cancellation is handled by the caller dropping this
    /// future, so implementations should only await cancel-safe operations.
    async fn run_once(&mut self) -> Result<(), DaisyError>;

    /// Called for every failed iteration, before the penalty is applied.
    fn on_error(&mut self, error: &DaisyError) {
        tracing::error!(error = %error, "loop iteration failed");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Created,
    Running,
    Cancelled,
}

/// What a loop did before it stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopReport {
    pub iterations: u64,
    pub failures: u64,
}

pub struct SupervisedLoop<T> {
    task: T,
    penalty: Arc<dyn PenaltyStrategy>,
    should_yield: bool,
    span: Span,
    state: LoopState,
    report: LoopReport,
}

impl<T: LoopTask> SupervisedLoop<T> {
    pub fn new(task: T, penalty: Arc<dyn PenaltyStrategy>) -> Self {
        Self {
            task,
            penalty,
            should_yield: false,
            span: Span::none(),
            state: LoopState::Created,
            report: LoopReport::default(),
        }
    }

    /// Yield to the scheduler after every iteration.
    pub fn with_yield(mut self, should_yield: bool) -> Self {
        self.should_yield = should_yield;
        self
    }

    /// Span that every log line of this loop is recorded under.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Run until `token` is cancelled.
    pub async fn run(mut self, token: CancellationToken) -> LoopReport {
        let span = self.span.clone();
        async move {
            self.state = LoopState::Running;
            self.run_until_cancelled(&token).await;
            self.state = LoopState::Cancelled;
            tracing::debug!(
                iterations = self.report.iterations,
                failures = self.report.failures,
                "loop exiting due to cancellation"
            );
            self.report
        }
        .instrument(span)
        .await
    }

    /// Spawn onto `runtime`. The loop starts running immediately.
    pub fn spawn(self, runtime: &Handle, token: CancellationToken) -> JoinHandle<LoopReport> {
        runtime.spawn(self.run(token))
    }

    async fn run_until_cancelled(&mut self, token: &CancellationToken) {
        while !token.is_cancelled() {
            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => return,
                outcome = self.task.run_once() => outcome,
            };
            self.report.iterations += 1;

            match outcome {
                Ok(()) => self.penalty.reset(),
                // Errors caused by the shutdown itself (closed channels) are not failures.
                Err(_) if token.is_cancelled() => return,
                Err(error) => {
                    self.report.failures += 1;
                    self.task.on_error(&error);
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => return,
                        _ = self.penalty.apply_and_increment() => {}
                    }
                }
            }

            if self.should_yield {
                tokio::task::yield_now().await;
            }
        }
    }
}
