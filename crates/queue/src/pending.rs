//! Delayed redeliveries still in flight

use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// How long `close` waits for delayed redeliveries
pub(crate) const REQUEUE_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Tracks delayed requeue tasks so a closing subscription can wait for them
pub(crate) struct PendingRequeues {
    tasks: Mutex<JoinSet<()>>,
}

impl PendingRequeues {
    pub(crate) fn new() -> Self {
        Self {
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    pub(crate) async fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock().await;
        while tasks.try_join_next().is_some() {}
        tasks.spawn(task);
    }

    /// Wait up to `limit` for every pending redelivery. Returns how many were
    /// abandoned.
    pub(crate) async fn drain(&self, limit: Duration) -> usize {
        let mut tasks = self.tasks.lock().await;
        if tasks.is_empty() {
            return 0;
        }
        debug!(pending = tasks.len(), "Waiting for requeued messages");

        let finished = tokio::time::timeout(limit, async {
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    warn!(error = %e, "Requeue task failed");
                }
            }
        })
        .await;

        if finished.is_err() {
            let abandoned = tasks.len();
            warn!(abandoned, "Timed out waiting for requeued messages");
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
            return abandoned;
        }
        0
    }
}
