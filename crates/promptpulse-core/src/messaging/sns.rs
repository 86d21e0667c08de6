//! SNS publisher (the `cloud_pubsub` publish side)
//!
//! Publishing is a fan-out to an SNS topic; each worker's SQS queue is
//! subscribed downstream, which is why queue bodies arrive in the SNS
//! wrapper envelope the parser understands. Logical topic names map to
//! topic ARNs from configuration.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::config::{ConfigError, PipelineConfig};

use super::{MessagePublisher, PublishError};

/// Publishes to SNS topics resolved from logical names
pub struct SnsPublisher {
    client: aws_sdk_sns::Client,
    topic_arns: HashMap<String, String>,
}

impl SnsPublisher {
    /// Build a publisher from the ambient AWS environment plus `config`
    pub async fn from_env(config: &PipelineConfig) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &config.sqs.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }
        let aws_config = loader.load().await;

        Self {
            client: aws_sdk_sns::Client::new(&aws_config),
            topic_arns: config.sns_topic_map(),
        }
    }

    fn resolve_arn(&self, topic_name: &str) -> Result<&str, ConfigError> {
        self.topic_arns
            .get(topic_name)
            .map(String::as_str)
            .ok_or_else(|| ConfigError::Missing(format!("sns topic arn for '{topic_name}'")))
    }
}

#[async_trait]
impl MessagePublisher for SnsPublisher {
    async fn publish(&self, topic_name: &str, payload: &str) -> Result<(), PublishError> {
        let topic_arn = self.resolve_arn(topic_name)?;

        self.client
            .publish()
            .topic_arn(topic_arn)
            .message(payload)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(topic = %topic_name, error = %e, "Failed to publish message to SNS");
                PublishError::Broker {
                    topic: topic_name.to_string(),
                    reason: e.to_string(),
                }
            })?;

        tracing::info!(topic = %topic_name, "Published message to SNS topic");
        Ok(())
    }
}
