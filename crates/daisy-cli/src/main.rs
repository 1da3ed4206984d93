mod handlers;
mod infinite;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use daisy_core::impls::{CountingObserver, InMemoryQueueTransport};
use daisy_core::ports::EventKind;
use daisy_core::router::DEFAULT_MESSAGE_TYPE_ATTRIBUTE;
use daisy_core::settings::EngineSettings;
use daisy_core::{
    Daisy, EngineConfig, EngineHandle, Message, MessageRouting, PenaltiesConfig, PenaltyConfig,
    ProcessingConfig, QueueDescriptor, TypeAttributeRouter,
};
use tokio::time::{Instant, interval};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::handlers::{GREETING_TYPE, Greeting, GreetingHandler};
use crate::infinite::InfiniteTransport;

#[derive(Parser, Debug)]
#[command(name = "daisy")]
#[command(about = "Run the daisy queue consumer against in-process queues")]
#[command(version)]
struct Cli {
    /// Engine settings file (JSON)
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Consume from two never-empty queues and report the processing rate
    Throughput {
        /// Stop once nothing was processed for a second, but not before this many seconds
        #[arg(long, default_value_t = 10)]
        min_secs: u64,

        /// Hard time limit
        #[arg(long)]
        max_secs: Option<u64>,

        /// Simulated latency of every receive, in milliseconds
        #[arg(long, default_value_t = 0)]
        latency_ms: u64,
    },

    /// Enqueue messages into in-memory queues and consume until all are deleted
    Demo {
        /// Number of messages to enqueue
        #[arg(short = 'n', long, default_value_t = 1000)]
        messages: u64,

        /// Fail the first delivery of every n-th message
        #[arg(long)]
        fail_every: Option<u64>,

        /// Visibility timeout of the in-memory queues, in milliseconds
        #[arg(long, default_value_t = 500)]
        visibility_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let settings = cli
        .config
        .as_ref()
        .map(|path| {
            EngineSettings::from_file(path)
                .with_context(|| format!("failed to load settings from {}", path.display()))
        })
        .transpose()?;

    match cli.command {
        Command::Throughput {
            min_secs,
            max_secs,
            latency_ms,
        } => throughput(settings, min_secs, max_secs, latency_ms).await,
        Command::Demo {
            messages,
            fail_every,
            visibility_ms,
        } => demo(settings, messages, fail_every, visibility_ms).await,
    }
}

fn greeting_router(fail_every: Option<u64>) -> Result<Arc<dyn MessageRouting>> {
    let router = TypeAttributeRouter::builder()
        .register(GREETING_TYPE, Arc::new(GreetingHandler::new(fail_every)))?
        .expect_types(&[GREETING_TYPE])
        .build()?;
    Ok(Arc::new(router))
}

async fn throughput(
    settings: Option<EngineSettings>,
    min_secs: u64,
    max_secs: Option<u64>,
    latency_ms: u64,
) -> Result<()> {
    let parallelism = ProcessingConfig::default().worker_count;
    let body = serde_json::to_string(&Greeting {
        message: "hello, world!".to_string(),
        seq: 1,
    })?;
    let template = Message::new("", "", body)
        .with_attribute(DEFAULT_MESSAGE_TYPE_ATTRIBUTE, GREETING_TYPE);
    let transport = Arc::new(
        InfiniteTransport::new(template).with_latency(Duration::from_millis(latency_ms)),
    );
    let observer = Arc::new(CountingObserver::new());

    let router = greeting_router(None)?;
    let config = match settings {
        Some(settings) => settings.into_config(router, transport, observer.clone()),
        None => {
            let queues = ["https://test.local/0000/queue-1", "https://test.local/0000/queue-1-dlq"]
                .into_iter()
                .map(|url| {
                    QueueDescriptor::new(url)
                        .with_batch_size(10)
                        .with_poller_count(parallelism)
                })
                .collect();
            EngineConfig::new(queues, router, transport)
                .with_processing(ProcessingConfig::default().with_worker_count(parallelism * 4))
                .with_penalties(PenaltiesConfig {
                    poll_exception: PenaltyConfig::backoff(Duration::from_secs(10)),
                    processing_exception: PenaltyConfig::backoff(Duration::from_secs(10)),
                })
                .with_observer(observer.clone())
        }
    };

    let handle = Daisy::new(config)?.run();
    tracing::info!("running until the processed count stalls, or ctrl-c");

    let started = Instant::now();
    let min_runtime = Duration::from_secs(min_secs);
    let max_runtime = max_secs.map(Duration::from_secs);
    let mut last = 0;
    let mut ticker = interval(Duration::from_secs(1));
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = handle.cancelled() => break,
            _ = tokio::signal::ctrl_c() => break,
        }
        let processed = observer.total(EventKind::ProcessedTotal);
        let per_second = processed - last;
        last = processed;
        tracing::info!(processed, per_second, "throughput");

        let elapsed = started.elapsed();
        if per_second == 0 && elapsed > min_runtime {
            tracing::info!("no more messages to process");
            break;
        }
        if max_runtime.is_some_and(|max| elapsed >= max) {
            tracing::info!("time limit reached");
            break;
        }
    }

    let report = handle.shutdown_and_join().await;
    println!(
        "processed {} messages in {:.1}s ({} loops, {} failed iterations)",
        observer.total(EventKind::ProcessedTotal),
        started.elapsed().as_secs_f64(),
        report.loops,
        report.failures,
    );
    Ok(())
}

async fn demo(
    settings: Option<EngineSettings>,
    messages: u64,
    fail_every: Option<u64>,
    visibility_ms: u64,
) -> Result<()> {
    let observer = Arc::new(CountingObserver::new());
    let transport = Arc::new(
        InMemoryQueueTransport::new()
            .with_visibility_timeout(Duration::from_millis(visibility_ms))
            .with_observer(observer.clone()),
    );

    let router = greeting_router(fail_every)?;
    let config = match settings {
        Some(settings) => settings.into_config(router, transport.clone(), observer.clone()),
        None => {
            let queues = ["orders", "invoices"]
                .into_iter()
                .map(|url| {
                    QueueDescriptor::new(url)
                        .with_wait_time(Duration::from_secs(1))
                        .with_empty_poll_penalty(PenaltyConfig::backoff(Duration::from_millis(500)))
                })
                .collect();
            EngineConfig::new(queues, router, transport.clone()).with_observer(observer.clone())
        }
    };
    let urls: Vec<String> = config.queues.iter().map(|q| q.url.clone()).collect();
    for url in &urls {
        transport.create_queue(url.as_str());
    }
    for seq in 0..messages {
        let url = &urls[(seq as usize) % urls.len()];
        let body = serde_json::to_string(&Greeting {
            message: format!("hello #{seq}"),
            seq,
        })?;
        let attributes =
            HashMap::from([(DEFAULT_MESSAGE_TYPE_ATTRIBUTE.to_string(), GREETING_TYPE.to_string())]);
        transport.send(url, body, attributes).await?;
    }
    tracing::info!(messages, queues = urls.len(), "messages enqueued");

    let handle = Daisy::new(config)?.run();
    let drained = wait_for_drain(&handle, &transport, &urls).await;
    let report = handle.shutdown_and_join().await;

    for (kind, queue, count) in observer.snapshot() {
        println!(
            "{:<28} {:<12} {count}",
            kind.metric_name(),
            queue.as_deref().unwrap_or("-")
        );
    }
    println!(
        "{} ({} loops, {} failed iterations)",
        if drained { "all messages deleted" } else { "interrupted" },
        report.loops,
        report.failures,
    );
    Ok(())
}

/// True once every queue is empty, false when interrupted first.
async fn wait_for_drain(
    handle: &EngineHandle,
    transport: &InMemoryQueueTransport,
    urls: &[String],
) -> bool {
    let mut ticker = interval(Duration::from_millis(100));
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = handle.cancelled() => return false,
            _ = tokio::signal::ctrl_c() => return false,
        }
        let remaining: usize = urls
            .iter()
            .map(|url| transport.visible_len(url) + transport.in_flight_len(url))
            .sum();
        if remaining == 0 {
            return true;
        }
        tracing::debug!(remaining, "waiting for queues to drain");
    }
}
