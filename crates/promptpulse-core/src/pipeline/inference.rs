//! Inference handler
//!
//! Status update -> model call -> result publish. Every failure lands in the
//! same place: the state record goes to `Failed` with the stringified cause
//! and the handler reports failure, leaving redelivery to the broker. A
//! publish failure after a successful model call therefore re-runs the model
//! on the next delivery; state updates are shallow merges, so the repeat is
//! harmless.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{InferenceMessage, JudgeMessage, RequestStage, StatePatch};
use crate::llm::{InferenceOptions, LlmError, ProviderFactory};
use crate::messaging::{
    HandlerError, MessageHandler, MessagePublisher, ParsedMessage, PublishError,
};
use crate::state::{StateError, StateRepository};

#[derive(thiserror::Error, Debug)]
enum InferenceFailure {
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Provider(#[from] LlmError),
    #[error(transparent)]
    Publish(#[from] PublishError),
    #[error("failed to encode judge message: {0}")]
    Serialization(String),
}

/// Runs target-model inference for each [`InferenceMessage`]
pub struct InferenceOrchestrator {
    state: Arc<dyn StateRepository>,
    publisher: Arc<dyn MessagePublisher>,
    provider_factory: Arc<dyn ProviderFactory>,
    judge_topic: String,
}

impl InferenceOrchestrator {
    /// Wire the handler to its collaborators
    pub fn new(
        state: Arc<dyn StateRepository>,
        publisher: Arc<dyn MessagePublisher>,
        provider_factory: Arc<dyn ProviderFactory>,
        judge_topic: impl Into<String>,
    ) -> Self {
        Self {
            state,
            publisher,
            provider_factory,
            judge_topic: judge_topic.into(),
        }
    }

    async fn orchestrate(&self, message: &InferenceMessage) -> Result<(), InferenceFailure> {
        let request_id = &message.request_id;

        self.state
            .update(request_id, &StatePatch::stage(RequestStage::Inference))
            .await?;

        let result = self.execute_inference(message).await?;
        self.state
            .update(request_id, &StatePatch::inference_result(result.clone()))
            .await?;

        let judge_message =
            JudgeMessage::new(request_id.clone(), message.gateway_request.clone(), result);
        let payload = serde_json::to_string(&judge_message)
            .map_err(|e| InferenceFailure::Serialization(e.to_string()))?;
        self.publisher.publish(&self.judge_topic, &payload).await?;

        Ok(())
    }

    async fn execute_inference(
        &self,
        message: &InferenceMessage,
    ) -> Result<crate::domain::InferenceResult, InferenceFailure> {
        let request = &message.gateway_request;
        let target_model = request.target_model_name();

        let provider = self
            .provider_factory
            .create_provider(target_model, &request.api_key)?;
        let model = self.provider_factory.resolve_model_name(target_model);

        let options = InferenceOptions::for_model(model);
        Ok(provider.generate(&request.prompt, &options).await?)
    }
}

#[async_trait]
impl MessageHandler for InferenceOrchestrator {
    async fn handle(&self, message: &ParsedMessage) -> Result<(), HandlerError> {
        let inference_message: InferenceMessage = message.decode()?;
        let request_id = inference_message.request_id.clone();

        match self.orchestrate(&inference_message).await {
            Ok(()) => {
                tracing::info!(request_id = %request_id, "Completed inference");
                Ok(())
            }
            Err(cause) => {
                tracing::error!(request_id = %request_id, error = %cause, "Inference failed");
                if let Err(e) = self
                    .state
                    .update(&request_id, &StatePatch::failed(cause.to_string()))
                    .await
                {
                    tracing::error!(request_id = %request_id, error = %e, "Failed to record failure in state");
                }
                Err(HandlerError::processing(cause))
            }
        }
    }
}
