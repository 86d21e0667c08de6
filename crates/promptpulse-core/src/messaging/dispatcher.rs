//! Bounded handler dispatch
//!
//! At most `max_worker_count` handlers run at once, enforced by a semaphore
//! whose permit is acquired *before* dispatch and released when the handler
//! finishes either way. The tracing span active at dispatch time is
//! re-entered inside the spawned handler task, so everything a handler logs
//! attributes to the originating message.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::Instrument;

use super::{HandlerError, MessageHandler, ParsedMessage};

/// The pool is closed; no further slots will be granted
#[derive(thiserror::Error, Debug)]
#[error("handler pool is closed")]
pub struct PoolClosed;

/// Bounded pool that runs a worker's message handler
#[derive(Clone)]
pub struct HandlerPool {
    handler: Arc<dyn MessageHandler>,
    permits: Arc<Semaphore>,
    max_worker_count: usize,
}

impl HandlerPool {
    /// Create a pool running `handler` on at most `max_worker_count` slots
    pub fn new(handler: Arc<dyn MessageHandler>, max_worker_count: usize) -> Self {
        Self {
            handler,
            permits: Arc::new(Semaphore::new(max_worker_count)),
            max_worker_count,
        }
    }

    /// The concurrency bound
    pub fn max_worker_count(&self) -> usize {
        self.max_worker_count
    }

    /// Slots not currently held by in-flight handlers
    pub fn available_slots(&self) -> usize {
        self.permits.available_permits()
    }

    /// Wait for a free handler slot
    ///
    /// Called by the consume loop before dispatching, which makes slot
    /// acquisition the loop's backpressure point.
    pub async fn acquire_slot(&self) -> Result<OwnedSemaphorePermit, PoolClosed> {
        Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| PoolClosed)
    }

    /// Stop granting slots; pending and future acquisitions fail
    pub fn close(&self) {
        self.permits.close();
    }

    /// Run the handler for one message on its own task
    ///
    /// The caller's current span travels into the task. A panicking handler
    /// is contained here and reported as a processing failure, so the
    /// finalizer path behind this call always runs.
    pub async fn run(&self, message: ParsedMessage) -> Result<(), HandlerError> {
        let handler = Arc::clone(&self.handler);
        let message_id = message.message_id.clone();
        let span = tracing::Span::current();

        let outcome =
            tokio::spawn(async move { handler.handle(&message).await }.instrument(span)).await;

        match outcome {
            Ok(result) => {
                if let Err(e) = &result {
                    tracing::error!(message_id = %message_id, error = %e, "Failed to handle queue message");
                }
                result
            }
            Err(join_error) => {
                tracing::error!(
                    message_id = %message_id,
                    error = %join_error,
                    "Handler task aborted"
                );
                Err(HandlerError::processing(format!(
                    "handler task aborted: {join_error}"
                )))
            }
        }
    }
}
