//! Event Queue
//!
//! A single subscription shared by every worker. Each delivery ends in exactly
//! one of two actions: acknowledge (remove for good) or requeue (redeliver later).

mod memory;
mod mqtt;
mod pending;

pub use memory::MemoryQueue;
pub use mqtt::{MqttConfig, MqttSubscription};

use async_trait::async_trait;
use thiserror::Error;

/// Queue error types
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Acknowledge failed: {0}")]
    Ack(String),

    #[error("Subscription closed")]
    Closed,
}

/// Backend state needed to settle a delivery
#[derive(Debug)]
pub(crate) enum AckToken {
    Memory,
    Mqtt(Box<rumqttc::Publish>),
}

/// A message taken from the subscription, pending ack or requeue
#[derive(Debug)]
pub struct Delivery {
    pub payload: Vec<u8>,
    /// Delivery attempt, starting at 1, where the backend tracks it
    pub attempts: u32,
    pub(crate) token: AckToken,
}

#[async_trait]
pub trait Subscription: Send + Sync {
    /// Wait for the next delivery. `None` once the subscription is closed and drained.
    async fn next(&self) -> Option<Delivery>;

    /// Settle permanently
    async fn ack(&self, delivery: Delivery) -> Result<(), QueueError>;

    /// Settle for redelivery after the configured delay
    async fn requeue(&self, delivery: Delivery) -> Result<(), QueueError>;

    /// Stop delivering, unsubscribe and disconnect
    async fn close(&self) -> Result<(), QueueError>;
}
