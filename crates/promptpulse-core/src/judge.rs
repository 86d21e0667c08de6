//! Judge gateway
//!
//! The judge model runs behind its own inference service; this client sends
//! it the original prompt and the target model's response and gets back a
//! scored verdict.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::ServiceEndpoint;
use crate::domain::JudgeResult;

/// Judge calls wait much longer than the other services: evaluation runs a
/// full model inference.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Errors from the judge service
#[derive(thiserror::Error, Debug)]
pub enum JudgeError {
    /// The service answered with an unexpected status
    #[error("judge service returned {status}: {body}")]
    Service {
        /// HTTP status code
        status: u16,
        /// Response body, for the log line
        body: String,
    },

    /// The service could not be reached
    #[error("judge transport error: {0}")]
    Transport(String),

    /// The verdict could not be decoded
    #[error("judge serialization error: {0}")]
    Serialization(String),
}

/// Scores a model response against its prompt
#[async_trait]
pub trait JudgeGateway: Send + Sync {
    /// Evaluate one response with the requested judge model
    async fn evaluate(
        &self,
        original_prompt: &str,
        model_response: &str,
        judge_model: &str,
    ) -> Result<JudgeResult, JudgeError>;

    /// Whether the service answers its health probe
    async fn is_healthy(&self) -> bool;
}

#[derive(Serialize)]
struct EvaluationRequest<'a> {
    original_prompt: &'a str,
    model_response: &'a str,
    model: &'a str,
}

/// HTTP client for the judge inference service
pub struct HttpJudgeClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpJudgeClient {
    /// Create a client for the configured endpoint
    pub fn new(endpoint: &ServiceEndpoint) -> Result<Self, JudgeError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| JudgeError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: endpoint.base_url(),
        })
    }
}

#[async_trait]
impl JudgeGateway for HttpJudgeClient {
    async fn evaluate(
        &self,
        original_prompt: &str,
        model_response: &str,
        judge_model: &str,
    ) -> Result<JudgeResult, JudgeError> {
        let response = self
            .client
            .post(format!("{}/judge", self.base_url))
            .json(&EvaluationRequest {
                original_prompt,
                model_response,
                model: judge_model,
            })
            .send()
            .await
            .map_err(|e| JudgeError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(JudgeError::Service {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        response
            .json()
            .await
            .map_err(|e| JudgeError::Serialization(e.to_string()))
    }

    async fn is_healthy(&self) -> bool {
        self.client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .map(|response| response.status().is_success())
            .unwrap_or(false)
    }
}
