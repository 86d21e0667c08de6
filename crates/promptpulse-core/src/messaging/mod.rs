//! Broker abstraction
//!
//! One publish/consume contract over two interchangeable backends: SNS+SQS
//! (`cloud_pubsub`) and Kafka (`log_broker`), selected from configuration at
//! process start. Backend-specific details - envelope shapes, receipt
//! handles, offsets, flow control - stay behind these traits; handlers only
//! ever see a [`ParsedMessage`].
//!
//! Delivery is at-least-once: a message is finalized (deleted from its queue
//! or its offset committed) only after the handler reports success, so
//! handlers must be idempotent on the state and archive they mutate.

pub mod dispatcher;
pub mod kafka;
pub mod memory;
pub mod sns;
pub mod sqs;

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::config::{BrokerKind, ConfigError, PipelineConfig};

/// A message as handlers see it, backend details stripped
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMessage {
    /// Broker-assigned message id (empty when the backend has none)
    pub message_id: String,
    /// Queue receipt handle; `None` on log-based backends
    pub receipt_handle: Option<String>,
    /// The decoded JSON payload
    pub contents: serde_json::Value,
    /// Attributes carried alongside the payload, when present
    pub attributes: Option<serde_json::Value>,
}

impl ParsedMessage {
    /// Decode the payload into a typed message
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, HandlerError> {
        serde_json::from_value(self.contents.clone())
            .map_err(|e| HandlerError::Malformed(e.to_string()))
    }
}

/// Publishes serialized messages to a logical topic
///
/// `publish` is synchronous in effect: it returns only once the broker has
/// durably accepted the message. Callers treat a publish failure inside a
/// handler as a handler failure, so the triggering message redelivers.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    /// Publish a payload to a logical topic
    async fn publish(&self, topic_name: &str, payload: &str) -> Result<(), PublishError>;
}

/// Handles one parsed message; failure triggers broker redelivery
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Process a message to completion
    async fn handle(&self, message: &ParsedMessage) -> Result<(), HandlerError>;
}

/// Consumes messages from a broker until closed
#[async_trait]
pub trait MessageConsumer: Send + Sync {
    /// Run the consume loop; returns after [`MessageConsumer::close`]
    async fn start(&self) -> Result<(), ConsumeError>;

    /// Stop receiving, wait out in-flight handlers up to the configured
    /// grace period, release broker resources
    async fn close(&self);
}

/// Errors from publishing to a broker
#[derive(thiserror::Error, Debug)]
pub enum PublishError {
    /// The broker rejected or failed the publish
    #[error("failed to publish to '{topic}': {reason}")]
    Broker {
        /// Logical topic name
        topic: String,
        /// Backend-reported cause
        reason: String,
    },

    /// Delivery was not confirmed within the flush timeout
    #[error("publish to '{topic}' timed out with {pending} message(s) pending")]
    FlushTimeout {
        /// Logical topic name
        topic: String,
        /// Messages still unconfirmed at the deadline
        pending: usize,
    },

    /// The logical topic has no configured destination
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors from a message handler
#[derive(thiserror::Error, Debug)]
pub enum HandlerError {
    /// The payload did not decode into the expected message type
    #[error("malformed message: {0}")]
    Malformed(String),

    /// Processing failed; the message should redeliver
    #[error("{0}")]
    Processing(String),
}

impl HandlerError {
    /// A processing failure with a stringified cause
    pub fn processing(cause: impl std::fmt::Display) -> Self {
        Self::Processing(cause.to_string())
    }
}

/// Errors from the consume loop
#[derive(thiserror::Error, Debug)]
pub enum ConsumeError {
    /// The broker connection could not be established or was lost
    #[error("broker error: {0}")]
    Broker(String),
}

/// Errors from assembling a broker backend
#[derive(thiserror::Error, Debug)]
pub enum BrokerSetupError {
    /// Required configuration was missing or invalid
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The backend client could not be created
    #[error("failed to create broker client: {0}")]
    Client(String),
}

/// Which queue or topic a worker consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerQueue {
    /// The inference worker's input
    Inference,
    /// The judge worker's input
    Judge,
}

impl WorkerQueue {
    fn sqs_queue_url(self, config: &PipelineConfig) -> Result<String, ConfigError> {
        let url = match self {
            WorkerQueue::Inference => config.sqs.inference_queue_url.as_deref(),
            WorkerQueue::Judge => config.sqs.judge_queue_url.as_deref(),
        };
        url.map(str::to_string).ok_or_else(|| {
            ConfigError::Missing(format!("sqs queue url for {self:?} worker"))
        })
    }

    fn kafka_topic(self, config: &PipelineConfig) -> String {
        match self {
            WorkerQueue::Inference => config.kafka.inference_topic.clone(),
            WorkerQueue::Judge => config.kafka.judge_topic.clone(),
        }
    }
}

/// Build the configured publisher backend
///
/// A process creates exactly one publisher and shares it.
pub async fn build_publisher(
    config: &PipelineConfig,
) -> Result<Arc<dyn MessagePublisher>, BrokerSetupError> {
    match config.messaging.broker {
        BrokerKind::CloudPubsub => {
            let publisher = sns::SnsPublisher::from_env(config).await;
            Ok(Arc::new(publisher))
        }
        BrokerKind::LogBroker => {
            let publisher = kafka::KafkaPublisher::new(&config.kafka)?;
            Ok(Arc::new(publisher))
        }
    }
}

/// Build the configured consumer backend for a worker
pub async fn build_consumer(
    config: &PipelineConfig,
    queue: WorkerQueue,
    handler: Arc<dyn MessageHandler>,
) -> Result<Arc<dyn MessageConsumer>, BrokerSetupError> {
    match config.messaging.broker {
        BrokerKind::CloudPubsub => {
            let queue_url = queue.sqs_queue_url(config)?;
            let client = Arc::new(sqs::SqsQueueClient::from_env(&config.sqs).await);
            let consumer = sqs::SqsConsumer::new(client, queue_url, &config.sqs, handler);
            Ok(Arc::new(consumer))
        }
        BrokerKind::LogBroker => {
            let topic = queue.kafka_topic(config);
            let consumer =
                kafka::KafkaConsumer::new(&config.kafka, topic, &config.sqs, handler)?;
            Ok(Arc::new(consumer))
        }
    }
}
