//! Daisy - the engine: wires pollers, the sampler and the worker pool
//! together under one cancellation scope.
//!
//! ```text
//!  queue A ─ producer ×n ─┐ (bounded, one batch)
//!  queue B ─ producer ×m ─┤
//!                         └─ sampler ─ work channel ─┬─ worker 0
//!                                                    ├─ worker 1
//!                                                    └─ worker N-1
//! ```

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::processor::{RoutingWorkProcessor, SharedWorkReceiver, WorkProcessing, WorkerLoop};
use super::producer::ProducerLoop;
use super::sampler::{RandomWorkSampler, SamplerLoop, WorkSampling};
use super::supervised::{LoopReport, SupervisedLoop};
use crate::action::{MessageDelayer, MessageDeleter};
use crate::config::EngineConfig;
use crate::error::ConfigError;
use crate::penalty::NoPenalty;
use crate::poller::{QueuePoller, QueuePolling};

/// A configured, not yet running engine.
///
/// `run` may be called more than once; each call builds a fresh set of
/// loops under a fresh scope.
pub struct Daisy {
    config: EngineConfig,
    sampler: Arc<dyn WorkSampling>,
}

impl Daisy {
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            sampler: Arc::new(RandomWorkSampler),
        })
    }

    /// Replace the fan-in strategy.
    pub fn with_sampler(mut self, sampler: Arc<dyn WorkSampling>) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start every loop and return immediately.
    ///
    /// # Panics
    /// When no runtime is configured and this is called outside a tokio runtime.
    pub fn run(&self) -> EngineHandle {
        let runtime = self
            .config
            .processing
            .runtime
            .clone()
            .unwrap_or_else(Handle::current);
        let scope = CancellationToken::new();
        let config = &self.config;
        let worker_count = config.processing.worker_count;

        let deleter = Arc::new(MessageDeleter::new(
            config.transport.clone(),
            config.observer.clone(),
        ));
        let delayer = Arc::new(MessageDelayer::new(
            config.transport.clone(),
            config.observer.clone(),
        ));
        let processor: Arc<dyn WorkProcessing> = Arc::new(RoutingWorkProcessor::new(
            config.router.clone(),
            deleter,
            delayer,
            config.observer.clone(),
        ));

        let mut producers = Vec::new();
        let mut inputs = Vec::new();
        for queue in &config.queues {
            for replica in 0..queue.poller_count.max(1) {
                let poller: Arc<dyn QueuePolling> = Arc::new(QueuePoller::new(
                    queue.url.clone(),
                    queue.batch_size,
                    queue.wait_time,
                    config.transport.clone(),
                    config.observer.clone(),
                ));
                let (tx, rx) = ProducerLoop::channel(poller.as_ref());
                inputs.push(rx);
                let producer =
                    ProducerLoop::new(poller, queue.empty_poll_penalty.make_penalty(), tx);
                producers.push(
                    SupervisedLoop::new(producer, config.penalties.poll_exception.make_penalty())
                        .with_yield(true)
                        .with_span(tracing::info_span!("producer", queue = %queue.url, replica)),
                );
            }
        }
        let producer_count = producers.len();

        let (work_tx, work_rx) = mpsc::channel(worker_count);
        let shared: SharedWorkReceiver = Arc::new(Mutex::new(work_rx));

        let mut tasks = Vec::with_capacity(producer_count + worker_count + 1);
        tasks.push(
            SupervisedLoop::new(
                SamplerLoop::new(self.sampler.clone(), inputs, work_tx, scope.clone()),
                Arc::new(NoPenalty),
            )
            .with_span(tracing::info_span!("sampler"))
            .spawn(&runtime, scope.clone()),
        );
        for worker in 0..worker_count {
            tasks.push(
                SupervisedLoop::new(
                    WorkerLoop::new(shared.clone(), processor.clone()),
                    config.penalties.processing_exception.make_penalty(),
                )
                .with_yield(true)
                .with_span(tracing::info_span!("worker", worker))
                .spawn(&runtime, scope.clone()),
            );
        }
        for producer in producers {
            tasks.push(producer.spawn(&runtime, scope.clone()));
        }

        tracing::info!(
            queues = config.queues.len(),
            producers = producer_count,
            workers = worker_count,
            "daisy started"
        );
        EngineHandle { scope, tasks }
    }
}

/// Totals over every loop of a stopped engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub loops: usize,
    pub iterations: u64,
    pub failures: u64,
    /// Loops that ended by panicking or being aborted instead of observing cancellation.
    pub aborted: usize,
}

/// Control over a running engine.
pub struct EngineHandle {
    scope: CancellationToken,
    tasks: Vec<JoinHandle<LoopReport>>,
}

impl EngineHandle {
    /// Ask every loop to stop. Returns immediately.
    pub fn cancel(&self) {
        self.scope.cancel();
    }

    pub fn request_shutdown(&self) {
        tracing::info!("shutdown requested");
        self.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.scope.is_cancelled()
    }

    /// The engine's scope. Cancelling a clone stops the engine too.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.scope.clone()
    }

    /// Resolves once the scope is cancelled, by the caller or by a fatal sampler failure.
    pub async fn cancelled(&self) {
        self.scope.cancelled().await;
    }

    pub fn is_finished(&self) -> bool {
        self.tasks.iter().all(JoinHandle::is_finished)
    }

    /// Wait until every loop has stopped. Does not cancel by itself.
    pub async fn join(self) -> ShutdownReport {
        let mut report = ShutdownReport {
            loops: self.tasks.len(),
            ..ShutdownReport::default()
        };
        for task in self.tasks {
            match task.await {
                Ok(LoopReport {
                    iterations,
                    failures,
                }) => {
                    report.iterations += iterations;
                    report.failures += failures;
                }
                Err(error) => {
                    tracing::warn!(error = %error, "loop did not stop cleanly");
                    report.aborted += 1;
                }
            }
        }
        tracing::info!(
            loops = report.loops,
            iterations = report.iterations,
            failures = report.failures,
            "daisy stopped"
        );
        report
    }

    pub async fn shutdown_and_join(self) -> ShutdownReport {
        self.request_shutdown();
        self.join().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PenaltiesConfig, ProcessingConfig, QueueDescriptor};
    use crate::domain::{Message, PostProcessAction, Work};
    use crate::error::{DaisyError, HandlerError};
    use crate::impls::{CountingObserver, InMemoryQueueTransport};
    use crate::penalty::PenaltyConfig;
    use crate::ports::{EventKind, MessageHandler, MessageRouting, QueueTransport};
    use crate::router::TypeAttributeRouter;
    use crate::testkit::{
        DrainingTransport, RecordingPenalty, StubDeletingTransport, TEST_TYPE_ATTRIBUTE,
        ThrowingTransport, make_message, wait_until,
    };
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(10);

    struct FnHandler<F>(F);

    #[async_trait]
    impl<F> MessageHandler for FnHandler<F>
    where
        F: Fn(&Message) -> Result<PostProcessAction, HandlerError> + Send + Sync,
    {
        async fn process(&self, message: &Message) -> Result<PostProcessAction, HandlerError> {
            (self.0)(message)
        }
    }

    fn handler<F>(f: F) -> Arc<dyn MessageHandler>
    where
        F: Fn(&Message) -> Result<PostProcessAction, HandlerError> + Send + Sync + 'static,
    {
        Arc::new(FnHandler(f))
    }

    fn router_for(handler: Arc<dyn MessageHandler>) -> Arc<dyn MessageRouting> {
        Arc::new(
            TypeAttributeRouter::builder()
                .attribute_name(TEST_TYPE_ATTRIBUTE)
                .register("test", handler)
                .unwrap()
                .build()
                .unwrap(),
        )
    }

    fn quick_queue(url: &str) -> QueueDescriptor {
        QueueDescriptor::new(url)
            .with_wait_time(Duration::ZERO)
            .with_batch_size(1)
            .with_empty_poll_penalty(PenaltyConfig::FixedDelay(Duration::from_millis(1)))
    }

    fn quick_penalties() -> PenaltiesConfig {
        PenaltiesConfig {
            poll_exception: PenaltyConfig::FixedDelay(Duration::from_millis(1)),
            processing_exception: PenaltyConfig::NoPenalty,
        }
    }

    fn engine(
        queues: Vec<QueueDescriptor>,
        handler: Arc<dyn MessageHandler>,
        transport: Arc<dyn QueueTransport>,
        worker_count: usize,
    ) -> EngineConfig {
        EngineConfig::new(queues, router_for(handler), transport)
            .with_processing(ProcessingConfig::default().with_worker_count(worker_count))
            .with_penalties(quick_penalties())
    }

    #[test]
    fn invalid_config_is_rejected_before_running() {
        let config = engine(
            vec![],
            handler(|_| Ok(PostProcessAction::Delete)),
            Arc::new(ThrowingTransport),
            1,
        );
        assert!(matches!(Daisy::new(config), Err(ConfigError::NoQueues)));
    }

    #[tokio::test]
    async fn single_message_is_deleted_exactly_once() {
        let transport =
            Arc::new(StubDeletingTransport::new(vec![make_message("r1")]).removing_when_seen());
        let config = engine(
            vec![quick_queue("q")],
            handler(|_| Ok(PostProcessAction::Delete)),
            transport.clone(),
            1,
        );
        let handle = Daisy::new(config).unwrap().run();

        wait_until(WAIT, || !transport.delete_calls().is_empty()).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.shutdown_and_join().await;

        assert_eq!(transport.delete_calls(), vec!["r1".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn every_message_is_processed_exactly_once() {
        let total = 100_000;
        let messages = (0..total).map(|i| make_message(format!("r{i}"))).collect();
        let seen = Arc::new(StdMutex::new(HashSet::<String>::new()));
        let calls = Arc::new(AtomicUsize::new(0));
        let counting = {
            let seen = seen.clone();
            let calls = calls.clone();
            handler(move |message| {
                calls.fetch_add(1, Ordering::SeqCst);
                seen.lock().unwrap().insert(message.receipt_handle.clone());
                Ok(PostProcessAction::DoNothing)
            })
        };
        let observer = Arc::new(CountingObserver::new());
        let config = engine(
            vec![quick_queue("q").with_batch_size(10)],
            counting,
            Arc::new(DrainingTransport::new(messages)),
            ProcessingConfig::default().worker_count,
        )
        .with_observer(observer.clone());
        let handle = Daisy::new(config).unwrap().run();

        wait_until(Duration::from_secs(60), || {
            observer.total(EventKind::ProcessedTotal) == total as u64
        })
        .await;
        let report = handle.shutdown_and_join().await;

        assert_eq!(calls.load(Ordering::SeqCst), total);
        assert_eq!(seen.lock().unwrap().len(), total);
        assert_eq!(observer.count(EventKind::Polled, "q"), total as u64);
        assert_eq!(report.failures, 0);
    }

    #[tokio::test]
    async fn redelivered_messages_eventually_complete() {
        let total = 20;
        let messages = (0..total).map(|i| make_message(format!("r{i}"))).collect();
        let transport = Arc::new(StubDeletingTransport::new(messages));
        let attempted = Arc::new(StdMutex::new(HashSet::<String>::new()));
        let completed = Arc::new(StdMutex::new(HashSet::<String>::new()));
        let flaky = {
            let attempted = attempted.clone();
            let completed = completed.clone();
            // Fails the first delivery of every message.
            handler(move |message| {
                let receipt = message.receipt_handle.clone();
                if attempted.lock().unwrap().insert(receipt.clone()) {
                    return Err(HandlerError::new("first delivery fails"));
                }
                completed.lock().unwrap().insert(receipt);
                Ok(PostProcessAction::Delete)
            })
        };
        let config = engine(vec![quick_queue("q")], flaky, transport.clone(), 2);
        let handle = Daisy::new(config).unwrap().run();

        let distinct_deletes =
            || transport.delete_calls().into_iter().collect::<HashSet<_>>().len();
        wait_until(WAIT, || distinct_deletes() == total).await;
        let report = handle.shutdown_and_join().await;

        assert_eq!(completed.lock().unwrap().len(), total);
        assert!(report.failures >= total as u64);
    }

    #[tokio::test]
    async fn processing_penalty_is_applied_once_per_exception() {
        let messages = (0..3).map(|i| make_message(format!("r{i}"))).collect();
        let transport = Arc::new(StubDeletingTransport::new(messages).removing_when_seen());
        let penalty = Arc::new(RecordingPenalty::default());
        let observer = Arc::new(CountingObserver::new());
        let config = engine(
            vec![quick_queue("q")],
            handler(|_| Err(HandlerError::new("always"))),
            transport,
            2,
        )
        .with_penalties(PenaltiesConfig {
            processing_exception: PenaltyConfig::custom(penalty.clone()),
            ..quick_penalties()
        })
        .with_observer(observer.clone());
        let handle = Daisy::new(config).unwrap().run();

        wait_until(WAIT, || penalty.applied() == 3).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.shutdown_and_join().await;

        assert_eq!(penalty.applied(), 3);
        assert_eq!(observer.count(EventKind::Failed, "q"), 3);
        assert_eq!(observer.count(EventKind::Processed, "q"), 0);
    }

    #[tokio::test]
    async fn failing_receive_is_penalized_and_keeps_running() {
        let penalty = Arc::new(RecordingPenalty::default());
        let config = engine(
            vec![quick_queue("q")],
            handler(|_| Ok(PostProcessAction::Delete)),
            Arc::new(ThrowingTransport),
            1,
        )
        .with_penalties(PenaltiesConfig {
            poll_exception: PenaltyConfig::custom(penalty.clone()),
            processing_exception: PenaltyConfig::NoPenalty,
        });
        let handle = Daisy::new(config).unwrap().run();

        wait_until(WAIT, || penalty.applied() >= 1).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!handle.is_cancelled());
        assert!(!handle.is_finished());
        let report = handle.shutdown_and_join().await;
        assert!(report.failures >= 1);
        assert_eq!(report.aborted, 0);
    }

    #[tokio::test]
    async fn empty_poll_penalty_is_applied_then_reset() {
        let transport = Arc::new(InMemoryQueueTransport::new());
        transport.create_queue("q");
        let penalty = Arc::new(RecordingPenalty::default());
        let config = engine(
            vec![quick_queue("q").with_empty_poll_penalty(PenaltyConfig::custom(penalty.clone()))],
            handler(|_| Ok(PostProcessAction::Delete)),
            transport.clone(),
            1,
        );
        let handle = Daisy::new(config).unwrap().run();

        wait_until(WAIT, || penalty.applied() >= 1).await;
        assert_eq!(penalty.resets(), 0);

        let attributes = HashMap::from([(TEST_TYPE_ATTRIBUTE.to_string(), "test".to_string())]);
        transport.send("q", "{}", attributes).await.unwrap();
        wait_until(WAIT, || penalty.resets() >= 1).await;
        handle.shutdown_and_join().await;
    }

    #[tokio::test]
    async fn in_memory_queue_is_drained() {
        let transport = Arc::new(InMemoryQueueTransport::new());
        let observer = Arc::new(CountingObserver::new());
        for url in ["a", "b"] {
            transport.create_queue(url);
            for i in 0..25 {
                let attributes =
                    HashMap::from([(TEST_TYPE_ATTRIBUTE.to_string(), "test".to_string())]);
                transport.send(url, format!("{url}-{i}"), attributes).await.unwrap();
            }
        }
        let config = engine(
            vec![
                quick_queue("a").with_batch_size(5),
                quick_queue("b").with_batch_size(5).with_poller_count(2),
            ],
            handler(|_| Ok(PostProcessAction::Delete)),
            transport.clone(),
            3,
        )
        .with_observer(observer.clone());
        let handle = Daisy::new(config).unwrap().run();

        wait_until(WAIT, || observer.total(EventKind::Deleted) == 50).await;
        handle.shutdown_and_join().await;

        assert_eq!(observer.count(EventKind::Processed, "a"), 25);
        assert_eq!(observer.count(EventKind::Processed, "b"), 25);
        for url in ["a", "b"] {
            assert_eq!(transport.visible_len(url), 0);
            assert_eq!(transport.in_flight_len(url), 0);
        }
    }

    struct BrokenSampler;

    #[async_trait]
    impl WorkSampling for BrokenSampler {
        async fn sample(&self, _inputs: &mut [mpsc::Receiver<Work>]) -> Result<Work, DaisyError> {
            Err(DaisyError::InputsClosed)
        }
    }

    #[tokio::test]
    async fn sampler_failure_stops_the_engine() {
        let transport = Arc::new(InMemoryQueueTransport::new());
        transport.create_queue("q");
        let config = engine(
            vec![quick_queue("q")],
            handler(|_| Ok(PostProcessAction::Delete)),
            transport,
            2,
        );
        let handle = Daisy::new(config)
            .unwrap()
            .with_sampler(Arc::new(BrokenSampler))
            .run();

        tokio::time::timeout(WAIT, handle.cancelled())
            .await
            .expect("sampler failure should cancel the engine");
        let report = tokio::time::timeout(WAIT, handle.join()).await.unwrap();

        assert_eq!(report.failures, 1);
        assert_eq!(report.aborted, 0);
    }

    #[tokio::test]
    async fn shutdown_stops_every_loop() {
        let transport = Arc::new(InMemoryQueueTransport::new());
        transport.create_queue("a");
        transport.create_queue("b");
        let config = engine(
            vec![
                quick_queue("a").with_poller_count(2),
                quick_queue("b").with_poller_count(3),
            ],
            handler(|_| Ok(PostProcessAction::Delete)),
            transport,
            4,
        )
        .with_processing(
            ProcessingConfig::default()
                .with_worker_count(4)
                .with_runtime(Handle::current()),
        );
        let handle = Daisy::new(config).unwrap().run();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        let report = tokio::time::timeout(WAIT, handle.shutdown_and_join())
            .await
            .expect("engine should stop promptly");

        assert_eq!(report.loops, 5 + 1 + 4);
        assert_eq!(report.aborted, 0);
    }
}
