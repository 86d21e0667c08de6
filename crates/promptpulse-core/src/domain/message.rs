//! Broker message envelopes
//!
//! Payloads are self-contained: each carries the originating submission so
//! workers can process a message without reading state first.

use serde::{Deserialize, Serialize};

use super::{GatewayRequest, InferenceResult};

/// Logical topic for inference work
pub const TOPIC_INFERENCE: &str = "inference";
/// Logical topic for judge work
pub const TOPIC_JUDGE: &str = "judge";

/// Tells an inference worker to run the target model for a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceMessage {
    /// The request this message belongs to
    pub request_id: String,
    /// Logical topic name, `"inference"`
    #[serde(default = "default_inference_topic")]
    pub topic_name: String,
    /// The originating submission
    pub gateway_request: GatewayRequest,
}

impl InferenceMessage {
    /// Build the message published at submission time
    pub fn new(request_id: impl Into<String>, gateway_request: GatewayRequest) -> Self {
        Self {
            request_id: request_id.into(),
            topic_name: TOPIC_INFERENCE.to_string(),
            gateway_request,
        }
    }
}

/// Tells a judge worker to score an inference response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeMessage {
    /// The request this message belongs to
    pub request_id: String,
    /// Logical topic name, `"judge"`
    #[serde(default = "default_judge_topic")]
    pub topic_name: String,
    /// The originating submission
    pub gateway_request: GatewayRequest,
    /// The inference output to be judged
    pub inference_result: InferenceResult,
}

impl JudgeMessage {
    /// Build the message published once inference finishes
    pub fn new(
        request_id: impl Into<String>,
        gateway_request: GatewayRequest,
        inference_result: InferenceResult,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            topic_name: TOPIC_JUDGE.to_string(),
            gateway_request,
            inference_result,
        }
    }

    /// The prompt the target model answered
    pub fn original_prompt(&self) -> &str {
        &self.gateway_request.prompt
    }

    /// The response under evaluation
    pub fn inference_response(&self) -> &str {
        &self.inference_result.response
    }

    /// Judge model identifier in `name:version` form
    pub fn judge_model_identifier(&self) -> String {
        self.gateway_request.judge_model_identifier()
    }
}

fn default_inference_topic() -> String {
    TOPIC_INFERENCE.to_string()
}

fn default_judge_topic() -> String {
    TOPIC_JUDGE.to_string()
}
