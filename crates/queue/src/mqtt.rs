//! MQTT Subscription
//!
//! The topic/channel pair maps to an MQTT shared subscription
//! (`$share/{channel}/{topic}`), so every consumer in the same channel competes
//! for messages while other channels get their own copy. Acks are manual.

use crate::pending::{PendingRequeues, REQUEUE_DRAIN_TIMEOUT};
use crate::{AckToken, Delivery, QueueError, Subscription};
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, Outgoing, Packet, QoS};
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const MAX_PACKET_SIZE: usize = 1024 * 1024;

/// MQTT connection configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Broker host
    pub host: String,
    /// Broker port
    pub port: u16,
    /// Client ID; generated when empty
    pub client_id: String,
    /// Topic carrying decoded events
    pub topic: String,
    /// Consumer group sharing the topic
    pub channel: String,
    /// Delay before a requeued message is republished
    pub requeue_delay_ms: u64,
    /// Deliveries buffered between the network loop and workers
    pub buffer: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: String::new(),
            topic: "decoded_events".to_string(),
            channel: "alerter".to_string(),
            requeue_delay_ms: 1000,
            buffer: 64,
        }
    }
}

impl MqttConfig {
    /// Shared-subscription filter for the topic/channel pair
    pub fn filter(&self) -> String {
        format!("$share/{}/{}", self.channel, self.topic)
    }
}

/// Subscription to a shared MQTT topic
pub struct MqttSubscription {
    config: MqttConfig,
    client: AsyncClient,
    rx: Mutex<mpsc::Receiver<Delivery>>,
    closing: Arc<AtomicBool>,
    event_loop: Mutex<Option<JoinHandle<()>>>,
    pending: PendingRequeues,
}

impl MqttSubscription {
    /// Connect and subscribe. The network loop runs on its own task.
    pub async fn connect(config: MqttConfig) -> Result<Self, QueueError> {
        let client_id = if config.client_id.is_empty() {
            format!("alerter-{}", Uuid::new_v4())
        } else {
            config.client_id.clone()
        };

        let mut options = MqttOptions::new(client_id, &config.host, config.port);
        options.set_keep_alive(Duration::from_secs(30));
        options.set_manual_acks(true);
        options.set_max_packet_size(MAX_PACKET_SIZE, MAX_PACKET_SIZE);

        let (client, mut eventloop) = AsyncClient::new(options, config.buffer.max(1));
        let (tx, rx) = mpsc::channel(config.buffer.max(1));
        let closing = Arc::new(AtomicBool::new(false));

        let loop_closing = closing.clone();
        let handle = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let delivery = Delivery {
                            payload: publish.payload.to_vec(),
                            attempts: 1,
                            token: AckToken::Mqtt(Box::new(publish)),
                        };
                        if tx.send(delivery).await.is_err() {
                            debug!("Subscription receiver dropped, stopping MQTT loop");
                            break;
                        }
                    }
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                        debug!("MQTT disconnect sent");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        if loop_closing.load(Ordering::SeqCst) {
                            break;
                        }
                        error!("MQTT error: {}", e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        });

        client
            .subscribe(config.filter(), QoS::AtLeastOnce)
            .await
            .map_err(|e| QueueError::Connection(e.to_string()))?;
        info!(host = %config.host, filter = %config.filter(), "Subscribed to MQTT broker");

        Ok(Self {
            config,
            client,
            rx: Mutex::new(rx),
            closing,
            event_loop: Mutex::new(Some(handle)),
            pending: PendingRequeues::new(),
        })
    }

    /// Publish a payload on the subscribed topic
    pub async fn publish(&self, payload: Vec<u8>) -> Result<(), QueueError> {
        self.client
            .publish(&self.config.topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| QueueError::Publish(e.to_string()))
    }
}

#[async_trait]
impl Subscription for MqttSubscription {
    async fn next(&self) -> Option<Delivery> {
        self.rx.lock().await.recv().await
    }

    async fn ack(&self, delivery: Delivery) -> Result<(), QueueError> {
        match delivery.token {
            AckToken::Mqtt(publish) => self
                .client
                .ack(&publish)
                .await
                .map_err(|e| QueueError::Ack(e.to_string())),
            AckToken::Memory => Ok(()),
        }
    }

    /// Republish after the delay, then settle the original delivery
    async fn requeue(&self, delivery: Delivery) -> Result<(), QueueError> {
        if self.closing.load(Ordering::SeqCst) {
            return Err(QueueError::Closed);
        }
        let client = self.client.clone();
        let topic = self.config.topic.clone();
        let delay = Duration::from_millis(self.config.requeue_delay_ms);

        self.pending
            .spawn(async move {
                tokio::time::sleep(delay).await;
                if let Err(e) = client
                    .publish(&topic, QoS::AtLeastOnce, false, delivery.payload.clone())
                    .await
                {
                    // Leave the original unacked so the broker redelivers it
                    warn!(error = %e, "Failed to republish requeued message");
                    return;
                }
                if let AckToken::Mqtt(publish) = delivery.token {
                    if let Err(e) = client.ack(&publish).await {
                        warn!(error = %e, "Failed to ack requeued message");
                    }
                }
            })
            .await;
        Ok(())
    }

    /// Unsubscribes, waits for delayed requeues to republish, then disconnects
    async fn close(&self) -> Result<(), QueueError> {
        if let Err(e) = self.client.unsubscribe(self.config.filter()).await {
            warn!(error = %e, "MQTT unsubscribe failed");
        }
        self.pending.drain(REQUEUE_DRAIN_TIMEOUT).await;

        self.closing.store(true, Ordering::SeqCst);
        self.client
            .disconnect()
            .await
            .map_err(|e| QueueError::Connection(e.to_string()))?;

        if let Some(handle) = self.event_loop.lock().await.take() {
            if tokio::time::timeout(Duration::from_secs(5), handle).await.is_err() {
                warn!("MQTT loop did not stop in time");
            }
        }
        info!("MQTT subscription closed");
        Ok(())
    }
}
