//! Judge handler
//!
//! Evaluate -> complete -> archive. This is the only writer of archive rows:
//! the full state record is read back, flattened, and inserted. A duplicate
//! insert (redelivered message whose earlier attempt already archived)
//! surfaces as a conflict and counts as success. When judging fails, the
//! failure record is archived best-effort - archive errors on that path are
//! logged and swallowed, and the handler still reports failure.

use std::sync::Arc;

use async_trait::async_trait;

use crate::archive::{ArchiveError, ArchiveGateway};
use crate::domain::{HistoryRecord, JudgeMessage, RequestStage, StatePatch};
use crate::judge::{JudgeError, JudgeGateway};
use crate::messaging::{HandlerError, MessageHandler, ParsedMessage};
use crate::state::{StateError, StateRepository};

#[derive(thiserror::Error, Debug)]
enum JudgmentFailure {
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Judge(#[from] JudgeError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error("state record for {0} disappeared before archiving")]
    MissingState(String),
}

/// Scores inference results and writes the durable record
pub struct JudgeOrchestrator {
    state: Arc<dyn StateRepository>,
    archive: Arc<dyn ArchiveGateway>,
    judge: Arc<dyn JudgeGateway>,
}

impl JudgeOrchestrator {
    /// Wire the handler to its collaborators
    pub fn new(
        state: Arc<dyn StateRepository>,
        archive: Arc<dyn ArchiveGateway>,
        judge: Arc<dyn JudgeGateway>,
    ) -> Self {
        Self {
            state,
            archive,
            judge,
        }
    }

    async fn orchestrate(&self, message: &JudgeMessage) -> Result<f64, JudgmentFailure> {
        let request_id = &message.request_id;

        self.state
            .update(request_id, &StatePatch::stage(RequestStage::Judge))
            .await?;

        let verdict = self
            .judge
            .evaluate(
                message.original_prompt(),
                message.inference_response(),
                &message.judge_model_identifier(),
            )
            .await?;
        let score = verdict.score;

        self.state
            .update(request_id, &StatePatch::completed(verdict))
            .await?;

        self.archive_request(request_id).await?;
        Ok(score)
    }

    /// Flatten the current state record into the archive
    async fn archive_request(&self, request_id: &str) -> Result<(), JudgmentFailure> {
        let record = self
            .state
            .get(request_id)
            .await?
            .ok_or_else(|| JudgmentFailure::MissingState(request_id.to_string()))?;

        let row = HistoryRecord::from_state(&record);
        match self.archive.create_history(&row).await {
            Ok(_) => Ok(()),
            Err(ArchiveError::Conflict { .. }) => {
                // An earlier delivery already archived this request.
                tracing::info!(request_id = %request_id, "Archive row already exists");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn handle_failure(&self, request_id: &str, cause: &JudgmentFailure) {
        tracing::error!(request_id = %request_id, error = %cause, "Judgment failed");

        if let Err(e) = self
            .state
            .update(request_id, &StatePatch::failed(cause.to_string()))
            .await
        {
            tracing::error!(request_id = %request_id, error = %e, "Failed to record failure in state");
        }

        // Best effort: a Failed row in the archive beats no row, but a dead
        // archive must not mask the original failure.
        if let Err(e) = self.archive_request(request_id).await {
            tracing::error!(request_id = %request_id, error = %e, "Failed to persist failure record");
        }
    }
}

#[async_trait]
impl MessageHandler for JudgeOrchestrator {
    async fn handle(&self, message: &ParsedMessage) -> Result<(), HandlerError> {
        let judge_message: JudgeMessage = message.decode()?;
        let request_id = judge_message.request_id.clone();

        match self.orchestrate(&judge_message).await {
            Ok(score) => {
                tracing::info!(request_id = %request_id, score, "Judgment completed");
                Ok(())
            }
            Err(cause) => {
                self.handle_failure(&request_id, &cause).await;
                Err(HandlerError::processing(cause))
            }
        }
    }
}
