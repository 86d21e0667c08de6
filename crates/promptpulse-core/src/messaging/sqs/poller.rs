//! Long-polling receive loop
//!
//! Receive errors surface as an empty batch so the consume loop keeps
//! running; pacing between empty receives stops a drained queue from being
//! hammered. The pace is measured from the *last receive attempt*, not from
//! wake-up, with a 1 ms floor.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{parse_batch, QueueApi};
use crate::messaging::ParsedMessage;

/// Sleep floor between receive attempts
const MIN_SLEEP: Duration = Duration::from_millis(1);

/// Paces receive attempts against an empty queue
struct PollPacer {
    interval: Duration,
    last_attempt: Instant,
}

impl PollPacer {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_attempt: Instant::now(),
        }
    }

    /// Sleep out the remainder of the interval since the last attempt
    async fn pace(&mut self) {
        let elapsed = self.last_attempt.elapsed();
        let remaining = self.interval.saturating_sub(elapsed).max(MIN_SLEEP);
        tokio::time::sleep(remaining).await;
        self.last_attempt = Instant::now();
    }
}

/// Long-polls an SQS queue and parses each received batch
pub struct SqsPoller {
    queue: Arc<dyn QueueApi>,
    queue_url: String,
    pacer: Mutex<PollPacer>,
}

impl SqsPoller {
    /// Create a poller for one queue
    pub fn new(queue: Arc<dyn QueueApi>, queue_url: impl Into<String>, interval: Duration) -> Self {
        Self {
            queue,
            queue_url: queue_url.into(),
            pacer: Mutex::new(PollPacer::new(interval)),
        }
    }

    /// Receive and parse one batch; paces first when the previous receive
    /// came back empty or failed
    pub async fn next_batch(&self) -> Vec<ParsedMessage> {
        let batch = match self.queue.receive_messages(&self.queue_url).await {
            Ok(received) => parse_batch(received),
            Err(e) => {
                tracing::error!(error = %e, "Could not poll messages from queue");
                Vec::new()
            }
        };

        if batch.is_empty() {
            self.pacer.lock().await.pace().await;
        }

        batch
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::messaging::sqs::{QueueApiError, RawQueueMessage};

    struct StubQueue {
        batches: Mutex<Vec<Result<Vec<RawQueueMessage>, QueueApiError>>>,
        receives: AtomicUsize,
    }

    impl StubQueue {
        fn new(batches: Vec<Result<Vec<RawQueueMessage>, QueueApiError>>) -> Self {
            Self {
                batches: Mutex::new(batches),
                receives: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl QueueApi for StubQueue {
        async fn receive_messages(
            &self,
            _queue_url: &str,
        ) -> Result<Vec<RawQueueMessage>, QueueApiError> {
            self.receives.fetch_add(1, Ordering::SeqCst);
            let mut batches = self.batches.lock().await;
            if batches.is_empty() {
                Ok(Vec::new())
            } else {
                batches.remove(0)
            }
        }

        async fn delete_message(
            &self,
            _queue_url: &str,
            _receipt_handle: &str,
        ) -> Result<(), QueueApiError> {
            Ok(())
        }

        async fn change_message_visibility(
            &self,
            _queue_url: &str,
            _receipt_handle: &str,
            _visibility_timeout: u32,
        ) -> Result<(), QueueApiError> {
            Ok(())
        }
    }

    fn raw_message(id: &str) -> RawQueueMessage {
        RawQueueMessage {
            message_id: Some(id.to_string()),
            receipt_handle: Some(format!("rh-{id}")),
            body: Some(r#"{"request_id":"u1"}"#.to_string()),
            attributes: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_poll_sleeps_at_least_the_interval() {
        let queue = Arc::new(StubQueue::new(vec![Ok(Vec::new())]));
        let poller = SqsPoller::new(queue, "q", Duration::from_secs(1));

        let start = Instant::now();
        let batch = poller.next_batch().await;
        assert!(batch.is_empty());
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_empty_poll_does_not_sleep() {
        let queue = Arc::new(StubQueue::new(vec![Ok(vec![raw_message("m-1")])]));
        let poller = SqsPoller::new(queue, "q", Duration::from_secs(5));

        let start = Instant::now();
        let batch = poller.next_batch().await;
        assert_eq!(batch.len(), 1);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_error_yields_empty_batch_and_paces() {
        let queue = Arc::new(StubQueue::new(vec![
            Err(QueueApiError::Sdk("connection reset".into())),
            Ok(vec![raw_message("m-1")]),
        ]));
        let poller = SqsPoller::new(queue.clone(), "q", Duration::from_secs(1));

        assert!(poller.next_batch().await.is_empty());
        assert_eq!(poller.next_batch().await.len(), 1);
        assert_eq!(queue.receives.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pace_measured_from_last_attempt() {
        let mut pacer = PollPacer::new(Duration::from_secs(1));

        // Most of the interval already elapsed doing other work; only the
        // remainder is slept.
        tokio::time::sleep(Duration::from_millis(900)).await;
        let start = Instant::now();
        pacer.pace().await;
        let slept = start.elapsed();
        assert!(slept >= Duration::from_millis(100));
        assert!(slept < Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pace_floor_when_interval_already_elapsed() {
        let mut pacer = PollPacer::new(Duration::from_millis(10));

        tokio::time::sleep(Duration::from_secs(1)).await;
        let start = Instant::now();
        pacer.pace().await;
        // Already past the interval, but the 1 ms floor still applies.
        assert!(start.elapsed() >= MIN_SLEEP);
        assert!(start.elapsed() < Duration::from_millis(10));
    }
}
