//! Kafka consumer

use std::sync::Arc;

use async_trait::async_trait;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::ClientConfig;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::{KafkaConfig, SqsConfig};
use crate::messaging::dispatcher::HandlerPool;
use crate::messaging::{
    BrokerSetupError, ConsumeError, MessageConsumer, MessageHandler, ParsedMessage,
};

/// At-least-once Kafka consumer with per-message commits
///
/// A single poll loop feeds messages through the bounded handler pool one at
/// a time. On handler success the consumer commits that message's offset; on
/// failure it commits nothing, so a rebalance or restart redelivers from the
/// failed message onward. Auto-commit is disabled.
pub struct KafkaConsumer {
    consumer: StreamConsumer,
    topic: String,
    pool: HandlerPool,
    cancel: CancellationToken,
}

impl KafkaConsumer {
    /// Create a consumer subscribed to `topic`
    pub fn new(
        config: &KafkaConfig,
        topic: String,
        worker_config: &SqsConfig,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Self, BrokerSetupError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.bootstrap_servers)
            .set("group.id", &config.group_id)
            .set("auto.offset.reset", &config.auto_offset_reset)
            .set("enable.auto.commit", "false")
            .create()
            .map_err(|e| BrokerSetupError::Client(e.to_string()))?;

        consumer
            .subscribe(&[&topic])
            .map_err(|e| BrokerSetupError::Client(e.to_string()))?;

        Ok(Self {
            consumer,
            topic,
            pool: HandlerPool::new(handler, worker_config.max_worker_count),
            cancel: CancellationToken::new(),
        })
    }

    fn parse(&self, message: &rdkafka::message::BorrowedMessage<'_>) -> Option<ParsedMessage> {
        let payload = match message.payload() {
            Some(bytes) => bytes,
            None => {
                tracing::warn!(topic = %self.topic, "Skipping Kafka message without payload");
                return None;
            }
        };

        match serde_json::from_slice(payload) {
            Ok(contents) => Some(ParsedMessage {
                message_id: format!(
                    "{}-{}-{}",
                    message.topic(),
                    message.partition(),
                    message.offset()
                ),
                receipt_handle: None,
                contents,
                attributes: None,
            }),
            Err(e) => {
                tracing::warn!(topic = %self.topic, error = %e, "Skipping Kafka message with non-JSON payload");
                None
            }
        }
    }
}

#[async_trait]
impl MessageConsumer for KafkaConsumer {
    async fn start(&self) -> Result<(), ConsumeError> {
        tracing::info!(topic = %self.topic, "Starting Kafka consume loop");

        while !self.cancel.is_cancelled() {
            let message = tokio::select! {
                _ = self.cancel.cancelled() => break,
                received = self.consumer.recv() => received,
            };

            let message = match message {
                Ok(message) => message,
                Err(e) => {
                    tracing::error!(topic = %self.topic, error = %e, "Kafka receive failed");
                    continue;
                }
            };

            let parsed = match self.parse(&message) {
                Some(parsed) => parsed,
                // Not committed: the broker redelivers it until operator
                // intervention, the same as any permanently failing message.
                None => continue,
            };

            let permit = match self.pool.acquire_slot().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            let span = tracing::info_span!(
                "handle_message",
                message_id = %parsed.message_id,
                topic = %self.topic,
            );
            let outcome = self.pool.run(parsed).instrument(span).await;
            drop(permit);

            if outcome.is_ok() {
                if let Err(e) = self.consumer.commit_message(&message, CommitMode::Async) {
                    tracing::error!(topic = %self.topic, error = %e, "Failed to commit Kafka offset");
                }
            }
        }

        self.close().await;
        tracing::warn!(topic = %self.topic, "Kafka consume loop ended");
        Ok(())
    }

    async fn close(&self) {
        self.cancel.cancel();
        self.pool.close();
    }
}
