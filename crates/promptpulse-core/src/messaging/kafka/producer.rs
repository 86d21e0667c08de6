//! Kafka publisher

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::error::KafkaError;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::util::Timeout;
use rdkafka::ClientConfig;

use crate::config::KafkaConfig;
use crate::domain::{TOPIC_INFERENCE, TOPIC_JUDGE};
use crate::messaging::{BrokerSetupError, MessagePublisher, PublishError};

/// Publishes to Kafka topics resolved from logical names
///
/// A publish resolves only once the broker confirms delivery; a delivery
/// still pending at the flush timeout fails the publish, which in turn
/// fails the handler that attempted it.
pub struct KafkaPublisher {
    producer: FutureProducer,
    topic_map: HashMap<String, String>,
    flush_timeout: Duration,
}

impl KafkaPublisher {
    /// Create a producer from `config`
    pub fn new(config: &KafkaConfig) -> Result<Self, BrokerSetupError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.bootstrap_servers)
            .set("client.id", &config.client_id)
            .create()
            .map_err(|e| BrokerSetupError::Client(e.to_string()))?;

        let mut topic_map = HashMap::new();
        topic_map.insert(TOPIC_INFERENCE.to_string(), config.inference_topic.clone());
        topic_map.insert(TOPIC_JUDGE.to_string(), config.judge_topic.clone());

        Ok(Self {
            producer,
            topic_map,
            flush_timeout: Duration::from_secs(config.flush_timeout_seconds),
        })
    }

    /// Flush outstanding deliveries, e.g. before process exit
    pub fn flush(&self) -> Result<(), PublishError> {
        self.producer
            .flush(Timeout::After(self.flush_timeout))
            .map_err(|e| PublishError::Broker {
                topic: "*".to_string(),
                reason: e.to_string(),
            })
    }

    fn resolve_topic<'a>(&'a self, topic_name: &'a str) -> &'a str {
        self.topic_map
            .get(topic_name)
            .map(String::as_str)
            .unwrap_or(topic_name)
    }
}

#[async_trait]
impl MessagePublisher for KafkaPublisher {
    async fn publish(&self, topic_name: &str, payload: &str) -> Result<(), PublishError> {
        let kafka_topic = self.resolve_topic(topic_name);
        let record = FutureRecord::<(), str>::to(kafka_topic).payload(payload);

        match self
            .producer
            .send(record, Timeout::After(self.flush_timeout))
            .await
        {
            Ok(_) => {
                tracing::info!(topic = %kafka_topic, "Published message to Kafka topic");
                Ok(())
            }
            Err((error, _unsent)) => {
                tracing::error!(topic = %kafka_topic, error = %error, "Failed to publish message to Kafka topic");
                if matches!(
                    error,
                    KafkaError::MessageProduction(RDKafkaErrorCode::MessageTimedOut)
                ) {
                    Err(PublishError::FlushTimeout {
                        topic: topic_name.to_string(),
                        pending: 1,
                    })
                } else {
                    Err(PublishError::Broker {
                        topic: topic_name.to_string(),
                        reason: error.to_string(),
                    })
                }
            }
        }
    }
}
