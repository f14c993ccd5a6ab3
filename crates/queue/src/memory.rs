//! In-process queue for single-node deployments and tests

use crate::pending::{PendingRequeues, REQUEUE_DRAIN_TIMEOUT};
use crate::{AckToken, Delivery, QueueError, Subscription};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

/// Bounded in-memory queue; requeued messages go back on the tail
pub struct MemoryQueue {
    tx: mpsc::Sender<Delivery>,
    rx: Mutex<mpsc::Receiver<Delivery>>,
    requeue_delay: Duration,
    pending: PendingRequeues,
    acked: AtomicUsize,
    requeued: AtomicUsize,
}

impl MemoryQueue {
    pub fn new(capacity: usize, requeue_delay: Duration) -> Self {
        info!(capacity, "Creating in-memory queue");
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Mutex::new(rx),
            requeue_delay,
            pending: PendingRequeues::new(),
            acked: AtomicUsize::new(0),
            requeued: AtomicUsize::new(0),
        }
    }

    /// Enqueue a payload for delivery
    pub async fn publish(&self, payload: Vec<u8>) -> Result<(), QueueError> {
        self.tx
            .send(Delivery {
                payload,
                attempts: 1,
                token: AckToken::Memory,
            })
            .await
            .map_err(|_| QueueError::Closed)
    }

    /// Messages acknowledged so far
    pub fn acked(&self) -> usize {
        self.acked.load(Ordering::SeqCst)
    }

    /// Messages requeued so far
    pub fn requeued(&self) -> usize {
        self.requeued.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Subscription for MemoryQueue {
    async fn next(&self) -> Option<Delivery> {
        self.rx.lock().await.recv().await
    }

    async fn ack(&self, _delivery: Delivery) -> Result<(), QueueError> {
        self.acked.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn requeue(&self, delivery: Delivery) -> Result<(), QueueError> {
        if self.tx.is_closed() {
            return Err(QueueError::Closed);
        }
        self.requeued.fetch_add(1, Ordering::SeqCst);
        let redelivery = Delivery {
            attempts: delivery.attempts + 1,
            ..delivery
        };
        debug!(attempts = redelivery.attempts, "Requeueing message");

        if self.requeue_delay.is_zero() {
            return self.tx.send(redelivery).await.map_err(|_| QueueError::Closed);
        }

        let tx = self.tx.clone();
        let delay = self.requeue_delay;
        self.pending
            .spawn(async move {
                tokio::time::sleep(delay).await;
                if tx.send(redelivery).await.is_err() {
                    warn!("Queue closed before requeued message was redelivered");
                }
            })
            .await;
        Ok(())
    }

    /// Waits for delayed requeues, then stops accepting messages. Anything
    /// already buffered can still be drained with `next`.
    async fn close(&self) -> Result<(), QueueError> {
        self.pending.drain(REQUEUE_DRAIN_TIMEOUT).await;
        self.rx.lock().await.close();
        info!("In-memory queue closed");
        Ok(())
    }
}
