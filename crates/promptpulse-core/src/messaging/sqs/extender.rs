//! Visibility extension for long-running handlers
//!
//! While a handler processes a message, a background task periodically
//! resets the message's visibility timeout so the broker doesn't hand it to
//! another consumer mid-processing. Entries are kept in
//! least-recently-extended order, so a scan can stop at the first entry
//! whose extension isn't due yet. A message past the configured max
//! processing time is deliberately not extended; it times out and
//! redelivers.

use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{QueueApi, QueueApiError};
use crate::config::SqsConfig;

/// Registration failed because the message is already in flight
#[derive(thiserror::Error, Debug)]
#[error("message {0} is already being processed")]
pub struct AlreadyRegistered(pub String);

struct InFlight {
    receipt_handle: String,
    started_at: Instant,
    last_extension: Instant,
}

/// Keeps in-flight messages visible only to their current handler
pub struct VisibilityExtender {
    queue: Arc<dyn QueueApi>,
    queue_url: String,
    extension_interval: Duration,
    visibility_timeout: u32,
    max_processing_time: Duration,
    shutdown_timeout: Duration,
    in_flight: Arc<Mutex<IndexMap<String, InFlight>>>,
    cancel: CancellationToken,
    worker: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl VisibilityExtender {
    /// Create an extender for one queue
    pub fn new(queue: Arc<dyn QueueApi>, queue_url: impl Into<String>, config: &SqsConfig) -> Self {
        Self {
            queue,
            queue_url: queue_url.into(),
            extension_interval: config.extension_interval(),
            visibility_timeout: config.visibility_timeout_seconds,
            max_processing_time: config.max_processing_time(),
            shutdown_timeout: config.shutdown_timeout(),
            in_flight: Arc::new(Mutex::new(IndexMap::new())),
            cancel: CancellationToken::new(),
            worker: Mutex::new(None),
        }
    }

    /// Spawn the background extension loop
    pub fn start(self: &Arc<Self>) {
        let extender = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = extender.cancel.cancelled() => break,
                    _ = tokio::time::sleep(extender.extension_interval) => {}
                }
                if extender.cancel.is_cancelled() {
                    break;
                }
                extender.extend_due_messages().await;
            }
        });
        *self.worker.lock() = Some(handle);
    }

    /// Track a message for the duration of its handler
    ///
    /// Must be called before the handler is dispatched.
    pub fn register(
        &self,
        message_id: impl Into<String>,
        receipt_handle: impl Into<String>,
    ) -> Result<(), AlreadyRegistered> {
        let message_id = message_id.into();
        let mut in_flight = self.in_flight.lock();
        if in_flight.contains_key(&message_id) {
            return Err(AlreadyRegistered(message_id));
        }
        let now = Instant::now();
        in_flight.insert(
            message_id,
            InFlight {
                receipt_handle: receipt_handle.into(),
                started_at: now,
                last_extension: now,
            },
        );
        Ok(())
    }

    /// Stop tracking a message; called on both success and failure paths
    pub fn unregister(&self, message_id: &str) -> bool {
        self.in_flight.lock().shift_remove(message_id).is_some()
    }

    /// Whether a message is currently tracked
    pub fn is_registered(&self, message_id: &str) -> bool {
        self.in_flight.lock().contains_key(message_id)
    }

    /// Number of tracked messages
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// One scan: extend everything due, oldest extension first
    ///
    /// Exposed for the consume runtime's tests; the background loop calls
    /// this every interval.
    pub async fn extend_due_messages(&self) {
        let now = Instant::now();
        let mut to_extend: Vec<(String, String)> = Vec::new();

        {
            let in_flight = self.in_flight.lock();
            for (message_id, entry) in in_flight.iter() {
                // Ordered by last extension: the first entry not yet due
                // means nothing after it is due either.
                if now.duration_since(entry.last_extension) < self.extension_interval {
                    break;
                }

                if now.duration_since(entry.started_at) > self.max_processing_time {
                    tracing::error!(
                        message_id = %message_id,
                        "Message exceeded max processing time, will not extend visibility"
                    );
                } else {
                    to_extend.push((message_id.clone(), entry.receipt_handle.clone()));
                }
            }
        }

        for (message_id, receipt_handle) in to_extend {
            match self.extend_one(&receipt_handle).await {
                Ok(()) => {
                    tracing::debug!(message_id = %message_id, "Extended message visibility timeout");
                    let mut in_flight = self.in_flight.lock();
                    if let Some(mut entry) = in_flight.shift_remove(&message_id) {
                        entry.last_extension = now;
                        in_flight.insert(message_id, entry);
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        message_id = %message_id,
                        error = %e,
                        "Failed to extend message visibility"
                    );
                }
            }
        }
    }

    async fn extend_one(&self, receipt_handle: &str) -> Result<(), QueueApiError> {
        self.queue
            .change_message_visibility(&self.queue_url, receipt_handle, self.visibility_timeout)
            .await
    }

    /// Stop the background loop, waiting up to the shutdown grace period
    pub async fn close(&self) {
        self.cancel.cancel();
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if tokio::time::timeout(self.shutdown_timeout, handle)
                .await
                .is_err()
            {
                tracing::warn!("Visibility extension loop did not stop within the grace period");
            }
        }
    }
}
