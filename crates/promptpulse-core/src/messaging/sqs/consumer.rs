//! The SQS consume loop
//!
//! Lifecycle per message: received -> registered with the extender ->
//! dispatched into the bounded pool -> finalized. Success deletes the
//! message; failure (or a panicking handler) leaves it for the broker to
//! redeliver after its visibility timeout. Registration happens before
//! dispatch and unregistration on every completion path, so the extension
//! registry cannot leak.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::OwnedSemaphorePermit;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

use super::{QueueApi, SqsPoller, VisibilityExtender};
use crate::config::SqsConfig;
use crate::messaging::dispatcher::HandlerPool;
use crate::messaging::{ConsumeError, MessageConsumer, MessageHandler, ParsedMessage};

/// At-least-once SQS consumer with visibility extension
pub struct SqsConsumer {
    queue: Arc<dyn QueueApi>,
    queue_url: String,
    poller: SqsPoller,
    extender: Arc<VisibilityExtender>,
    pool: HandlerPool,
    shutdown_timeout: Duration,
    cancel: CancellationToken,
    tasks: TaskTracker,
}

impl SqsConsumer {
    /// Assemble a consumer for one queue and one handler
    pub fn new(
        queue: Arc<dyn QueueApi>,
        queue_url: impl Into<String>,
        config: &SqsConfig,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        let queue_url = queue_url.into();
        Self {
            poller: SqsPoller::new(
                Arc::clone(&queue),
                queue_url.clone(),
                config.receive_attempt_interval(),
            ),
            extender: Arc::new(VisibilityExtender::new(
                Arc::clone(&queue),
                queue_url.clone(),
                config,
            )),
            pool: HandlerPool::new(handler, config.max_worker_count),
            shutdown_timeout: config.shutdown_timeout(),
            cancel: CancellationToken::new(),
            tasks: TaskTracker::new(),
            queue,
            queue_url,
        }
    }

    async fn poll_loop(&self) {
        tracing::info!(queue_url = %self.queue_url, "Starting message polling loop");

        'poll: while !self.cancel.is_cancelled() {
            let batch = tokio::select! {
                _ = self.cancel.cancelled() => break 'poll,
                batch = self.poller.next_batch() => batch,
            };

            for message in batch {
                if self.cancel.is_cancelled() {
                    break 'poll;
                }

                tracing::debug!(message_id = %message.message_id, "SQS message received");

                let permit = tokio::select! {
                    _ = self.cancel.cancelled() => break 'poll,
                    slot = self.pool.acquire_slot() => match slot {
                        Ok(permit) => permit,
                        Err(_) => break 'poll,
                    },
                };

                self.dispatch(message, permit);
            }
        }
    }

    /// Register, then hand the message to its own handler task
    fn dispatch(&self, message: ParsedMessage, permit: OwnedSemaphorePermit) {
        let span = tracing::info_span!(
            "handle_message",
            message_id = %message.message_id,
            queue_url = %self.queue_url,
        );

        let receipt_handle = message.receipt_handle.clone().unwrap_or_default();
        if let Err(e) = self
            .extender
            .register(message.message_id.clone(), receipt_handle.clone())
        {
            // A duplicate id means this delivery is already in flight here;
            // leave the message alone and let visibility sort it out.
            tracing::warn!(error = %e, "Skipping message already in flight");
            return;
        }

        let pool = self.pool.clone();
        let extender = Arc::clone(&self.extender);
        let queue = Arc::clone(&self.queue);
        let queue_url = self.queue_url.clone();

        self.tasks.spawn(
            async move {
                let message_id = message.message_id.clone();
                let outcome = pool.run(message).await;

                if outcome.is_ok() {
                    if let Err(e) = queue.delete_message(&queue_url, &receipt_handle).await {
                        // The handler finished; a failed delete just means a
                        // redundant redelivery later.
                        tracing::error!(
                            message_id = %message_id,
                            error = %e,
                            "Failed to delete handled message"
                        );
                    }
                }

                extender.unregister(&message_id);
                drop(permit);
            }
            .instrument(span),
        );
    }
}

#[async_trait]
impl MessageConsumer for SqsConsumer {
    async fn start(&self) -> Result<(), ConsumeError> {
        tracing::info!("Starting visibility extension loop");
        self.extender.start();

        self.poll_loop().await;

        self.close().await;
        tracing::warn!("SQS consumer poll loop ended");
        Ok(())
    }

    async fn close(&self) {
        self.cancel.cancel();
        self.pool.close();

        self.tasks.close();
        if tokio::time::timeout(self.shutdown_timeout, self.tasks.wait())
            .await
            .is_err()
        {
            tracing::warn!("In-flight handlers outlived the shutdown grace period; abandoning them");
        }

        self.extender.close().await;
    }
}
