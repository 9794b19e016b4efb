//! Redpanda (Kafka-compatible) batch publisher.
//!
//! Each emitter tick becomes one JSON message per channel, on
//! `{prefix}.transfers-batch` and `{prefix}.swaps-batch`.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::{error, info};
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use serde::Serialize;

use crate::config::RedpandaSettings;
use crate::db::models::{SwapEvent, TransferEvent};
use crate::pubsub::BatchSink;

/// Envelope of one outbound batch.
#[derive(Serialize)]
struct BatchMessage<'a, T> {
    count: usize,
    items: &'a [T],
}

pub struct RedpandaPublisher {
    producer: FutureProducer,
    topic_prefix: String,
}

impl RedpandaPublisher {
    /// Returns None if Redpanda is disabled in settings or the producer
    /// cannot be created.
    pub fn new(settings: &RedpandaSettings) -> Option<Self> {
        if !settings.enabled {
            info!("Redpanda publishing is disabled");
            return None;
        }

        info!("Connecting to Redpanda brokers: {}", settings.brokers);

        let producer: FutureProducer = match ClientConfig::new()
            .set("bootstrap.servers", &settings.brokers)
            .set("message.timeout.ms", "5000")
            .set("queue.buffering.max.messages", "10000")
            .set("linger.ms", "5")
            .create()
        {
            Ok(p) => p,
            Err(e) => {
                error!("Failed to create Redpanda producer: {}", e);
                return None;
            },
        };

        info!(
            "Redpanda publisher initialized with topic prefix: {}",
            settings.topic_prefix
        );

        Some(Self {
            producer,
            topic_prefix: settings.topic_prefix.clone(),
        })
    }

    fn topic(&self, channel: &str) -> String {
        format!("{}.{}-batch", self.topic_prefix, channel)
    }

    async fn publish_message<T: Serialize>(&self, topic: &str, key: &str, value: &T) -> Result<()> {
        let payload = serde_json::to_string(value)
            .with_context(|| format!("Failed to serialize message for {}", topic))?;

        let record = FutureRecord::to(topic).key(key).payload(&payload);

        self.producer
            .send(record, Duration::from_millis(100))
            .await
            .map_err(|(e, _)| anyhow!("Failed to send message to {}: {}", topic, e))?;

        Ok(())
    }

    /// Flush any pending messages (call on shutdown).
    pub fn flush(&self) {
        self.producer.flush(Duration::from_secs(5)).ok();
    }
}

#[async_trait]
impl BatchSink for RedpandaPublisher {
    async fn emit_transfers(&self, batch: &[TransferEvent]) -> Result<()> {
        let key = batch.first().map(|t| t.block.to_string()).unwrap_or_default();
        let message = BatchMessage {
            count: batch.len(),
            items: batch,
        };
        self.publish_message(&self.topic("transfers"), &key, &message).await
    }

    async fn emit_swaps(&self, batch: &[SwapEvent]) -> Result<()> {
        let key = batch.first().map(|s| s.block.to_string()).unwrap_or_default();
        let message = BatchMessage {
            count: batch.len(),
            items: batch,
        };
        self.publish_message(&self.topic("swaps"), &key, &message).await
    }
}

impl Drop for RedpandaPublisher {
    fn drop(&mut self) {
        self.flush();
    }
}
