//! Alerter - Main Entry Point

use alerter::config::AppConfig;
use alerter::{init_logging, init_metrics, run};
use tokio::sync::watch;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    init_logging(&config.log_level, config.log_json)?;

    info!("=== Alerter v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        concurrency = config.concurrency,
        queue = ?config.queue.kind,
        cache = ?config.cache.kind,
        "Starting alert workers"
    );

    if let Some(addr) = config.metrics_addr {
        init_metrics(addr)?;
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown requested, finishing in-flight messages");
        let _ = shutdown_tx.send(true);
    });

    run(config, shutdown_rx).await?;
    info!("Alerter stopped");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            warn!(error = %e, "SIGTERM handler unavailable, waiting for ctrl-c only");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
