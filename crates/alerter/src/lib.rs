//! Alerter Service
//!
//! Wires configuration to the pipeline: picks the queue, cache and storage
//! backends, installs logging and the metrics exporter, and runs the workers
//! until shutdown.

pub mod config;

use crate::config::{AppConfig, CacheKind, QueueKind};
use alerting::{serve, DedupGate, Processor, Stores};
use anyhow::Context;
use cache::{Cache, MemoryCache, SqliteCache};
use metrics_exporter_prometheus::PrometheusBuilder;
use notify::{Dispatcher, FakeNotifier};
use queue::{MemoryQueue, MqttSubscription, Subscription};
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use storage::SqliteStore;
use tokio::sync::watch;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

const MEMORY_QUEUE_CAPACITY: usize = 1024;
const CACHE_PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Initialize the global tracing subscriber
pub fn init_logging(level: &str, json: bool) -> anyhow::Result<()> {
    let level = Level::from_str(level).with_context(|| format!("invalid log level {level:?}"))?;
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);

    let installed = if json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    installed.context("Failed to set tracing subscriber")
}

/// Serve Prometheus metrics on `addr`
pub fn init_metrics(addr: SocketAddr) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;
    info!(%addr, "Metrics exporter listening");
    Ok(())
}

/// Build every backend named by `config` and run the workers until `shutdown`
pub async fn run(config: AppConfig, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
    let store = Arc::new(
        SqliteStore::connect(&config.database_url)
            .await
            .context("Failed to open database")?,
    );

    let cache: Arc<dyn Cache> = match config.cache.kind {
        CacheKind::Memory => {
            let cache = Arc::new(MemoryCache::new());
            let purged = cache.clone();
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(CACHE_PURGE_INTERVAL);
                loop {
                    tick.tick().await;
                    purged.purge_expired();
                }
            });
            cache
        }
        CacheKind::Sqlite => {
            let cache = Arc::new(
                SqliteCache::with_pool(store.pool().clone())
                    .await
                    .context("Failed to prepare cache table")?,
            );
            let purged = cache.clone();
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(CACHE_PURGE_INTERVAL);
                loop {
                    tick.tick().await;
                    if let Err(e) = purged.purge_expired().await {
                        warn!(error = %e, "Cache purge failed");
                    }
                }
            });
            cache
        }
    };

    let subscription: Arc<dyn Subscription> = match config.queue.kind {
        QueueKind::Memory => {
            warn!("Using in-memory queue: only events published in this process are consumed");
            Arc::new(MemoryQueue::new(
                MEMORY_QUEUE_CAPACITY,
                Duration::from_millis(config.queue.requeue_delay_ms),
            ))
        }
        QueueKind::Mqtt => Arc::new(
            MqttSubscription::connect(config.queue.mqtt())
                .await
                .context("Failed to subscribe to event queue")?,
        ),
    };

    let dispatcher = Dispatcher::new(
        Arc::new(FakeNotifier::new()),
        cache.clone(),
        config.rate_limits.clone(),
    );
    let processor = Arc::new(Processor::new(
        Stores::shared(store),
        DedupGate::new(cache),
        dispatcher,
        config.timeouts.clone(),
    ));

    serve(subscription, processor, config.concurrency, shutdown).await?;
    Ok(())
}
