//! Request submission
//!
//! The only synchronous entry point: persist the fresh state record, publish
//! the inference message, acknowledge. There is no compensation - if either
//! step fails the error propagates to the HTTP layer as a 5xx and the client
//! retries with a fresh request id.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{GatewayRequest, InferenceMessage, ProcessedRequest, RequestStatus};
use crate::messaging::{MessagePublisher, PublishError};
use crate::state::{StateError, StateRepository};

/// Submission acknowledgement returned to the client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayResponse {
    /// UUID assigned to the request
    pub request_id: String,
    /// Always `Accepted` on success
    pub status: RequestStatus,
}

/// Errors from submission
#[derive(thiserror::Error, Debug)]
pub enum SubmitError {
    /// The state record could not be created
    #[error(transparent)]
    State(#[from] StateError),

    /// The inference message could not be published
    #[error(transparent)]
    Publish(#[from] PublishError),

    /// The message payload could not be encoded
    #[error("failed to encode message: {0}")]
    Serialization(String),
}

/// Accepts submissions and serves request metadata
pub struct SubmissionService {
    state: Arc<dyn StateRepository>,
    publisher: Arc<dyn MessagePublisher>,
    inference_topic: String,
}

impl SubmissionService {
    /// Wire the service to its state store and publisher
    pub fn new(
        state: Arc<dyn StateRepository>,
        publisher: Arc<dyn MessagePublisher>,
        inference_topic: impl Into<String>,
    ) -> Self {
        Self {
            state,
            publisher,
            inference_topic: inference_topic.into(),
        }
    }

    /// Accept a request: create state at the Gateway stage, publish, ack
    pub async fn submit(&self, request: GatewayRequest) -> Result<GatewayResponse, SubmitError> {
        let request_id = Uuid::new_v4().to_string();

        let record = ProcessedRequest::new(&request_id, request.clone());
        self.state.create(&request_id, &record).await?;

        let message = InferenceMessage::new(&request_id, request);
        let payload = serde_json::to_string(&message)
            .map_err(|e| SubmitError::Serialization(e.to_string()))?;
        self.publisher
            .publish(&self.inference_topic, &payload)
            .await?;

        tracing::info!(request_id = %request_id, "Accepted request");
        Ok(GatewayResponse {
            request_id,
            status: RequestStatus::Accepted,
        })
    }

    /// Current state of a request; `None` once expired or never known
    pub async fn metadata(&self, request_id: &str) -> Result<Option<ProcessedRequest>, StateError> {
        self.state.get(request_id).await
    }
}
