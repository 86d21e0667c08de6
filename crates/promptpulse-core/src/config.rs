//! Pipeline configuration
//!
//! TOML-based configuration for every process in the pipeline. Each knob has
//! a serde default so a minimal file only names what differs from the
//! defaults.
//!
//! # Example TOML Configuration
//!
//! ```toml
//! [messaging]
//! broker = "cloud_pubsub"
//!
//! [topics]
//! inference = "inference"
//! judge = "judge"
//!
//! [sqs]
//! inference_queue_url = "https://sqs.us-east-1.amazonaws.com/123/inference"
//! judge_queue_url = "https://sqs.us-east-1.amazonaws.com/123/judge"
//! visibility_timeout_seconds = 300
//! visibility_extension_interval_seconds = 30
//! max_message_process_time_seconds = 600
//! max_worker_count = 10
//!
//! [sns]
//! inference_topic_arn = "arn:aws:sns:us-east-1:123:inference"
//! judge_topic_arn = "arn:aws:sns:us-east-1:123:judge"
//!
//! [redis]
//! host = "redis"
//! port = 6379
//! default_ttl_seconds = 604800
//!
//! [services.archive]
//! host = "archive-service"
//! port = 8002
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Which broker backend a process uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerKind {
    /// SNS fan-out into per-worker SQS queues
    CloudPubsub,
    /// Kafka topics with consumer-group offsets
    LogBroker,
}

/// Broker selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagingConfig {
    /// Backend selected at process start; a process uses exactly one
    #[serde(default = "default_broker")]
    pub broker: BrokerKind,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            broker: default_broker(),
        }
    }
}

fn default_broker() -> BrokerKind {
    BrokerKind::CloudPubsub
}

/// Logical topic names used by publishers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicsConfig {
    /// Logical name of the inference topic
    #[serde(default = "default_inference_topic")]
    pub inference: String,
    /// Logical name of the judge topic
    #[serde(default = "default_judge_topic")]
    pub judge: String,
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            inference: default_inference_topic(),
            judge: default_judge_topic(),
        }
    }
}

fn default_inference_topic() -> String {
    "inference".to_string()
}

fn default_judge_topic() -> String {
    "judge".to_string()
}

/// SQS consumer tuning and queue addressing
///
/// The intended relationship between the timing knobs is
/// `visibility_extension_interval < visibility_timeout` (extensions fire
/// before expiry) and `max_message_process_time >= k * visibility_timeout`
/// for some integer `k > 1`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqsConfig {
    /// Queue the inference worker consumes
    #[serde(default)]
    pub inference_queue_url: Option<String>,
    /// Queue the judge worker consumes
    #[serde(default)]
    pub judge_queue_url: Option<String>,
    /// AWS region override; falls back to the ambient AWS environment
    #[serde(default)]
    pub region: Option<String>,
    /// Visibility timeout requested on receive and on each extension
    #[serde(default = "default_visibility_timeout")]
    pub visibility_timeout_seconds: u32,
    /// How often the extender scans in-flight messages
    #[serde(default = "default_extension_interval")]
    pub visibility_extension_interval_seconds: u64,
    /// Messages processing longer than this are left to time out
    #[serde(default = "default_max_processing_time")]
    pub max_message_process_time_seconds: u64,
    /// Long-poll wait passed to ReceiveMessage
    #[serde(default = "default_wait_time")]
    pub wait_time_seconds: u32,
    /// Pacing between receive attempts when the queue is empty
    #[serde(default = "default_seconds_between_receive_attempts")]
    pub seconds_between_receive_attempts: f64,
    /// Maximum concurrently in-flight handlers per process
    #[serde(default = "default_max_worker_count")]
    pub max_worker_count: usize,
    /// Grace period for in-flight handlers on close()
    #[serde(default = "default_shutdown_timeout")]
    pub consumer_shutdown_timeout_seconds: u64,
}

impl Default for SqsConfig {
    fn default() -> Self {
        Self {
            inference_queue_url: None,
            judge_queue_url: None,
            region: None,
            visibility_timeout_seconds: default_visibility_timeout(),
            visibility_extension_interval_seconds: default_extension_interval(),
            max_message_process_time_seconds: default_max_processing_time(),
            wait_time_seconds: default_wait_time(),
            seconds_between_receive_attempts: default_seconds_between_receive_attempts(),
            max_worker_count: default_max_worker_count(),
            consumer_shutdown_timeout_seconds: default_shutdown_timeout(),
        }
    }
}

impl SqsConfig {
    /// Extension scan interval as a [`Duration`]
    pub fn extension_interval(&self) -> Duration {
        Duration::from_secs(self.visibility_extension_interval_seconds)
    }

    /// Max processing time as a [`Duration`]
    pub fn max_processing_time(&self) -> Duration {
        Duration::from_secs(self.max_message_process_time_seconds)
    }

    /// Empty-poll pacing as a [`Duration`]
    pub fn receive_attempt_interval(&self) -> Duration {
        Duration::from_secs_f64(self.seconds_between_receive_attempts.max(0.0))
    }

    /// Shutdown grace period as a [`Duration`]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.consumer_shutdown_timeout_seconds)
    }
}

fn default_visibility_timeout() -> u32 {
    300
}

fn default_extension_interval() -> u64 {
    30
}

fn default_max_processing_time() -> u64 {
    600
}

fn default_wait_time() -> u32 {
    20
}

fn default_seconds_between_receive_attempts() -> f64 {
    1.0
}

fn default_max_worker_count() -> usize {
    10
}

fn default_shutdown_timeout() -> u64 {
    30
}

/// SNS topic addressing for the cloud_pubsub backend
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnsConfig {
    /// Topic ARN behind the logical inference topic
    #[serde(default)]
    pub inference_topic_arn: Option<String>,
    /// Topic ARN behind the logical judge topic
    #[serde(default)]
    pub judge_topic_arn: Option<String>,
}

/// Kafka addressing and consumer-group settings for the log_broker backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KafkaConfig {
    /// Comma-separated bootstrap servers
    #[serde(default = "default_bootstrap_servers")]
    pub bootstrap_servers: String,
    /// Producer client id
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Consumer group id
    #[serde(default = "default_group_id")]
    pub group_id: String,
    /// Where a fresh group starts reading
    #[serde(default = "default_auto_offset_reset")]
    pub auto_offset_reset: String,
    /// Kafka topic behind the logical inference topic
    #[serde(default = "default_inference_topic")]
    pub inference_topic: String,
    /// Kafka topic behind the logical judge topic
    #[serde(default = "default_judge_topic")]
    pub judge_topic: String,
    /// Producer delivery-confirmation timeout in seconds
    #[serde(default = "default_flush_timeout")]
    pub flush_timeout_seconds: u64,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: default_bootstrap_servers(),
            client_id: default_client_id(),
            group_id: default_group_id(),
            auto_offset_reset: default_auto_offset_reset(),
            inference_topic: default_inference_topic(),
            judge_topic: default_judge_topic(),
            flush_timeout_seconds: default_flush_timeout(),
        }
    }
}

fn default_bootstrap_servers() -> String {
    "localhost:9092".to_string()
}

fn default_client_id() -> String {
    "promptpulse-producer".to_string()
}

fn default_group_id() -> String {
    "promptpulse".to_string()
}

fn default_auto_offset_reset() -> String {
    "earliest".to_string()
}

fn default_flush_timeout() -> u64 {
    10
}

/// State store connection and record lifetime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis host
    #[serde(default = "default_redis_host")]
    pub host: String,
    /// Redis port
    #[serde(default = "default_redis_port")]
    pub port: u16,
    /// TTL applied to state records; one week by default
    #[serde(default = "default_state_ttl")]
    pub default_ttl_seconds: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: default_redis_host(),
            port: default_redis_port(),
            default_ttl_seconds: default_state_ttl(),
        }
    }
}

impl RedisConfig {
    /// Connection URL for the redis client
    pub fn url(&self) -> String {
        format!("redis://{}:{}", self.host, self.port)
    }
}

fn default_redis_host() -> String {
    "127.0.0.1".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_state_ttl() -> u64 {
    7 * 24 * 60 * 60
}

/// Host/port pair for a collaborating HTTP service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    /// Hostname
    pub host: String,
    /// Port
    pub port: u16,
}

impl ServiceEndpoint {
    /// Base URL for HTTP clients
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Collaborating services and local listen addresses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    /// Where the gateway's submission API listens
    #[serde(default = "default_gateway_endpoint")]
    pub gateway: ServiceEndpoint,
    /// Archive (history) service
    #[serde(default = "default_archive_endpoint")]
    pub archive: ServiceEndpoint,
    /// Judge inference service
    #[serde(default = "default_judge_endpoint")]
    pub judge: ServiceEndpoint,
    /// Port each worker's health endpoint binds on
    #[serde(default = "default_health_port")]
    pub health_port: u16,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            gateway: default_gateway_endpoint(),
            archive: default_archive_endpoint(),
            judge: default_judge_endpoint(),
            health_port: default_health_port(),
        }
    }
}

fn default_gateway_endpoint() -> ServiceEndpoint {
    ServiceEndpoint {
        host: "0.0.0.0".to_string(),
        port: 8000,
    }
}

fn default_archive_endpoint() -> ServiceEndpoint {
    ServiceEndpoint {
        host: "archive-service".to_string(),
        port: 8002,
    }
}

fn default_judge_endpoint() -> ServiceEndpoint {
    ServiceEndpoint {
        host: "judge-inference-service".to_string(),
        port: 8003,
    }
}

fn default_health_port() -> u16 {
    8081
}

/// Top-level configuration for every pipeline process
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Broker selection
    #[serde(default)]
    pub messaging: MessagingConfig,
    /// Logical topic names
    #[serde(default)]
    pub topics: TopicsConfig,
    /// SQS consumer tuning and addressing
    #[serde(default)]
    pub sqs: SqsConfig,
    /// SNS topic addressing
    #[serde(default)]
    pub sns: SnsConfig,
    /// Kafka addressing and consumer settings
    #[serde(default)]
    pub kafka: KafkaConfig,
    /// State store settings
    #[serde(default)]
    pub redis: RedisConfig,
    /// Collaborating services
    #[serde(default)]
    pub services: ServicesConfig,
}

impl PipelineConfig {
    /// Load configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Toml(e.to_string()))
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Map a logical topic name to its SNS topic ARN
    pub fn sns_topic_arn(&self, logical_name: &str) -> Result<&str, ConfigError> {
        let arn = if logical_name == self.topics.inference {
            self.sns.inference_topic_arn.as_deref()
        } else if logical_name == self.topics.judge {
            self.sns.judge_topic_arn.as_deref()
        } else {
            None
        };
        arn.ok_or_else(|| ConfigError::Missing(format!("sns topic arn for '{logical_name}'")))
    }

    /// Map a logical topic name to its Kafka topic
    ///
    /// Unknown logical names pass through unchanged, as a literal topic.
    pub fn kafka_topic<'a>(&'a self, logical_name: &'a str) -> &'a str {
        if logical_name == self.topics.inference {
            &self.kafka.inference_topic
        } else if logical_name == self.topics.judge {
            &self.kafka.judge_topic
        } else {
            logical_name
        }
    }

    /// The SNS topic map keyed by logical name
    pub fn sns_topic_map(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        if let Some(arn) = &self.sns.inference_topic_arn {
            map.insert(self.topics.inference.clone(), arn.clone());
        }
        if let Some(arn) = &self.sns.judge_topic_arn {
            map.insert(self.topics.judge.clone(), arn.clone());
        }
        map
    }
}

/// Errors raised while loading configuration
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The file could not be read
    #[error("IO error: {0}")]
    Io(String),

    /// The file is not valid TOML for this schema
    #[error("TOML parsing error: {0}")]
    Toml(String),

    /// A required key has no value
    #[error("missing configuration: {0}")]
    Missing(String),
}
