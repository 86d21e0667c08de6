//! Narrow SQS client seam
//!
//! The consumer runtime talks to the queue through [`QueueApi`] so the
//! poller, extender, and finalizer can be exercised against stub queues in
//! tests. [`SqsQueueClient`] is the AWS SDK implementation.

use async_trait::async_trait;
use aws_sdk_sqs::types::Message;

use crate::config::SqsConfig;

/// A received queue message before envelope parsing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawQueueMessage {
    /// Broker-assigned message id
    pub message_id: Option<String>,
    /// Receipt handle used for delete and visibility changes
    pub receipt_handle: Option<String>,
    /// Raw message body
    pub body: Option<String>,
    /// Queue-level message attributes as JSON
    pub attributes: Option<serde_json::Value>,
}

impl From<Message> for RawQueueMessage {
    fn from(message: Message) -> Self {
        let attributes = message.message_attributes.as_ref().map(|map| {
            let entries: serde_json::Map<String, serde_json::Value> = map
                .iter()
                .map(|(name, value)| {
                    let value = value
                        .string_value()
                        .map(|s| serde_json::Value::String(s.to_string()))
                        .unwrap_or(serde_json::Value::Null);
                    (name.clone(), value)
                })
                .collect();
            serde_json::Value::Object(entries)
        });

        Self {
            message_id: message.message_id,
            receipt_handle: message.receipt_handle,
            body: message.body,
            attributes,
        }
    }
}

/// Errors from queue operations
#[derive(thiserror::Error, Debug)]
pub enum QueueApiError {
    /// The SDK call failed
    #[error("queue operation failed: {0}")]
    Sdk(String),
}

/// The slice of the SQS API the consumer runtime uses
#[async_trait]
pub trait QueueApi: Send + Sync {
    /// Long-poll the queue for a batch of messages
    async fn receive_messages(
        &self,
        queue_url: &str,
    ) -> Result<Vec<RawQueueMessage>, QueueApiError>;

    /// Delete a handled message
    async fn delete_message(
        &self,
        queue_url: &str,
        receipt_handle: &str,
    ) -> Result<(), QueueApiError>;

    /// Reset a message's visibility timeout
    async fn change_message_visibility(
        &self,
        queue_url: &str,
        receipt_handle: &str,
        visibility_timeout: u32,
    ) -> Result<(), QueueApiError>;
}

/// AWS SDK implementation of [`QueueApi`]
pub struct SqsQueueClient {
    client: aws_sdk_sqs::Client,
    visibility_timeout: u32,
    wait_time: u32,
}

impl SqsQueueClient {
    /// Build a client from the ambient AWS environment plus `config`
    pub async fn from_env(config: &SqsConfig) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }
        let aws_config = loader.load().await;

        Self {
            client: aws_sdk_sqs::Client::new(&aws_config),
            visibility_timeout: config.visibility_timeout_seconds,
            wait_time: config.wait_time_seconds,
        }
    }
}

#[async_trait]
impl QueueApi for SqsQueueClient {
    async fn receive_messages(
        &self,
        queue_url: &str,
    ) -> Result<Vec<RawQueueMessage>, QueueApiError> {
        let response = self
            .client
            .receive_message()
            .queue_url(queue_url)
            .visibility_timeout(self.visibility_timeout as i32)
            .wait_time_seconds(self.wait_time as i32)
            .message_attribute_names("All")
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to receive messages from SQS queue");
                QueueApiError::Sdk(e.to_string())
            })?;

        Ok(response
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(RawQueueMessage::from)
            .collect())
    }

    async fn delete_message(
        &self,
        queue_url: &str,
        receipt_handle: &str,
    ) -> Result<(), QueueApiError> {
        self.client
            .delete_message()
            .queue_url(queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to delete message from SQS queue");
                QueueApiError::Sdk(e.to_string())
            })?;
        Ok(())
    }

    async fn change_message_visibility(
        &self,
        queue_url: &str,
        receipt_handle: &str,
        visibility_timeout: u32,
    ) -> Result<(), QueueApiError> {
        self.client
            .change_message_visibility()
            .queue_url(queue_url)
            .receipt_handle(receipt_handle)
            .visibility_timeout(visibility_timeout as i32)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to change SQS message visibility timeout");
                QueueApiError::Sdk(e.to_string())
            })?;
        Ok(())
    }
}
