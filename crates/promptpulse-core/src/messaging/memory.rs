//! In-memory broker
//!
//! A process-local twin of the real backends used by the end-to-end tests:
//! per-topic queues, at-least-once redelivery of failed messages, and
//! failure injection on the publish side. Semantics mirror the shared
//! contract, not any one backend's timing.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::dispatcher::HandlerPool;
use super::{
    ConsumeError, MessageConsumer, MessageHandler, MessagePublisher, ParsedMessage, PublishError,
};

const IDLE_POLL: Duration = Duration::from_millis(2);
const REDELIVERY_DELAY: Duration = Duration::from_millis(5);

#[derive(Default)]
struct TopicState {
    pending: VecDeque<String>,
    published: Vec<String>,
    failures_to_inject: usize,
}

/// Process-local broker with per-topic queues
#[derive(Default)]
pub struct InMemoryBroker {
    topics: Mutex<HashMap<String, TopicState>>,
    sequence: AtomicU64,
}

impl InMemoryBroker {
    /// Create an empty broker
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Messages waiting on a topic
    pub fn pending(&self, topic_name: &str) -> usize {
        self.topics
            .lock()
            .get(topic_name)
            .map(|t| t.pending.len())
            .unwrap_or(0)
    }

    /// Every payload ever accepted for a topic, in publish order
    pub fn published(&self, topic_name: &str) -> Vec<String> {
        self.topics
            .lock()
            .get(topic_name)
            .map(|t| t.published.clone())
            .unwrap_or_default()
    }

    /// Make the next `count` publishes to a topic fail
    pub fn fail_next_publishes(&self, topic_name: &str, count: usize) {
        self.topics
            .lock()
            .entry(topic_name.to_string())
            .or_default()
            .failures_to_inject = count;
    }

    /// Build a consumer bound to one topic
    pub fn consumer(
        self: &Arc<Self>,
        topic_name: impl Into<String>,
        handler: Arc<dyn MessageHandler>,
        max_worker_count: usize,
    ) -> InMemoryConsumer {
        InMemoryConsumer {
            broker: Arc::clone(self),
            topic_name: topic_name.into(),
            pool: HandlerPool::new(handler, max_worker_count),
            cancel: CancellationToken::new(),
        }
    }

    fn pop(&self, topic_name: &str) -> Option<String> {
        self.topics
            .lock()
            .get_mut(topic_name)
            .and_then(|t| t.pending.pop_front())
    }

    fn requeue(&self, topic_name: &str, payload: String) {
        self.topics
            .lock()
            .entry(topic_name.to_string())
            .or_default()
            .pending
            .push_back(payload);
    }
}

#[async_trait]
impl MessagePublisher for InMemoryBroker {
    async fn publish(&self, topic_name: &str, payload: &str) -> Result<(), PublishError> {
        let mut topics = self.topics.lock();
        let topic = topics.entry(topic_name.to_string()).or_default();

        if topic.failures_to_inject > 0 {
            topic.failures_to_inject -= 1;
            return Err(PublishError::Broker {
                topic: topic_name.to_string(),
                reason: "injected publish failure".to_string(),
            });
        }

        topic.pending.push_back(payload.to_string());
        topic.published.push(payload.to_string());
        Ok(())
    }
}

/// Consumes one in-memory topic, redelivering failed messages
pub struct InMemoryConsumer {
    broker: Arc<InMemoryBroker>,
    topic_name: String,
    pool: HandlerPool,
    cancel: CancellationToken,
}

#[async_trait]
impl MessageConsumer for InMemoryConsumer {
    async fn start(&self) -> Result<(), ConsumeError> {
        while !self.cancel.is_cancelled() {
            let payload = match self.broker.pop(&self.topic_name) {
                Some(payload) => payload,
                None => {
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(IDLE_POLL) => continue,
                    }
                }
            };

            let contents: serde_json::Value = match serde_json::from_str(&payload) {
                Ok(contents) => contents,
                Err(e) => {
                    tracing::warn!(topic = %self.topic_name, error = %e, "Dropping non-JSON payload");
                    continue;
                }
            };

            let message = ParsedMessage {
                message_id: format!("mem-{}", self.broker.sequence.fetch_add(1, Ordering::SeqCst)),
                receipt_handle: None,
                contents,
                attributes: None,
            };

            let permit = match self.pool.acquire_slot().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            let span = tracing::info_span!(
                "handle_message",
                message_id = %message.message_id,
                topic = %self.topic_name,
            );
            let outcome = self.pool.run(message).instrument(span).await;
            drop(permit);

            if outcome.is_err() {
                tokio::time::sleep(REDELIVERY_DELAY).await;
                self.broker.requeue(&self.topic_name, payload);
            }
        }
        Ok(())
    }

    async fn close(&self) {
        self.cancel.cancel();
        self.pool.close();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::messaging::HandlerError;

    struct FlakyHandler {
        failures_left: AtomicUsize,
        successes: AtomicUsize,
    }

    #[async_trait]
    impl MessageHandler for FlakyHandler {
        async fn handle(&self, _message: &ParsedMessage) -> Result<(), HandlerError> {
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                Err(HandlerError::processing("transient"))
            } else {
                self.successes.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_publish_and_consume() {
        let broker = InMemoryBroker::new();
        broker.publish("t", r#"{"n":1}"#).await.unwrap();
        assert_eq!(broker.pending("t"), 1);
        assert_eq!(broker.published("t").len(), 1);

        let handler = Arc::new(FlakyHandler {
            failures_left: AtomicUsize::new(0),
            successes: AtomicUsize::new(0),
        });
        let consumer = Arc::new(broker.consumer("t", handler.clone(), 2));
        let running = {
            let consumer = Arc::clone(&consumer);
            tokio::spawn(async move { consumer.start().await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        consumer.close().await;
        running.await.unwrap().unwrap();

        assert_eq!(handler.successes.load(Ordering::SeqCst), 1);
        assert_eq!(broker.pending("t"), 0);
    }

    #[tokio::test]
    async fn test_failed_message_redelivers_until_success() {
        let broker = InMemoryBroker::new();
        broker.publish("t", r#"{"n":1}"#).await.unwrap();

        let handler = Arc::new(FlakyHandler {
            failures_left: AtomicUsize::new(2),
            successes: AtomicUsize::new(0),
        });
        let consumer = Arc::new(broker.consumer("t", handler.clone(), 1));
        let running = {
            let consumer = Arc::clone(&consumer);
            tokio::spawn(async move { consumer.start().await })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        consumer.close().await;
        running.await.unwrap().unwrap();

        // Two failed deliveries, then the one that stuck.
        assert_eq!(handler.successes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_publish_failure_injection() {
        let broker = InMemoryBroker::new();
        broker.fail_next_publishes("t", 1);

        assert!(broker.publish("t", "{}").await.is_err());
        broker.publish("t", "{}").await.unwrap();
        assert_eq!(broker.published("t").len(), 1);
    }
}
