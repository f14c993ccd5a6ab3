//! Worker Pool
//!
//! `concurrency` workers share one subscription. Each takes the next delivery,
//! processes it to completion, then acks or requeues it. Shutdown stops workers
//! between messages; the subscription is closed once all of them have exited.

use crate::{AlertingError, Outcome, Processor};
use queue::Subscription;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

const PROGRESS_EVERY: u64 = 100;

/// Run workers until `shutdown` turns true (or its sender is dropped), or the
/// subscription ends. In-flight messages are finished before returning.
pub async fn serve(
    subscription: Arc<dyn Subscription>,
    processor: Arc<Processor>,
    concurrency: usize,
    shutdown: watch::Receiver<bool>,
) -> Result<(), AlertingError> {
    let concurrency = concurrency.max(1);
    info!(concurrency, "Starting alert workers");

    let processed = Arc::new(AtomicU64::new(0));
    let mut workers = JoinSet::new();
    for id in 0..concurrency {
        workers.spawn(worker(
            id,
            subscription.clone(),
            processor.clone(),
            shutdown.clone(),
            processed.clone(),
        ));
    }

    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "Worker task failed");
        }
    }

    subscription.close().await?;
    info!(
        processed = processed.load(Ordering::Relaxed),
        "Alert workers stopped"
    );
    Ok(())
}

async fn worker(
    id: usize,
    subscription: Arc<dyn Subscription>,
    processor: Arc<Processor>,
    mut shutdown: watch::Receiver<bool>,
    processed: Arc<AtomicU64>,
) {
    debug!(worker = id, "Worker started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        let delivery = tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            delivery = subscription.next() => match delivery {
                Some(delivery) => delivery,
                None => break,
            },
        };

        let settled = match processor.handle(&delivery.payload).await {
            Outcome::Ack => subscription.ack(delivery).await,
            Outcome::Requeue => subscription.requeue(delivery).await,
        };
        if let Err(e) = settled {
            warn!(worker = id, error = %e, "Failed to settle delivery");
        }

        let count = processed.fetch_add(1, Ordering::Relaxed) + 1;
        if count % PROGRESS_EVERY == 0 {
            info!(processed = count, "Processed messages");
        }
    }

    debug!(worker = id, "Worker stopped");
}
