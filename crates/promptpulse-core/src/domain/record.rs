//! The ephemeral state record and its partial update

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{GatewayRequest, InferenceResult, JudgeResult, RequestStage};

/// Per-request coordination state, stored under `request:{uuid}` with a TTL
///
/// Created once at submission and mutated by the workers as the request
/// moves through its stages. The archive row is flattened out of the final
/// version of this record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedRequest {
    /// UUID v4 chosen at submission
    pub request_id: String,
    /// The original submission
    pub gateway_request: GatewayRequest,
    /// Current lifecycle stage
    pub stage: RequestStage,
    /// Present at or after the Judge stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inference_result: Option<InferenceResult>,
    /// Present once Completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judge_result: Option<JudgeResult>,
    /// Stringified cause when the request failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Set at submission
    pub created_at: DateTime<Utc>,
    /// Refreshed on every mutation
    pub updated_at: DateTime<Utc>,
}

impl ProcessedRequest {
    /// Create a fresh record at the Gateway stage
    pub fn new(request_id: impl Into<String>, gateway_request: GatewayRequest) -> Self {
        let now = Utc::now();
        Self {
            request_id: request_id.into(),
            gateway_request,
            stage: RequestStage::Gateway,
            inference_result: None,
            judge_result: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The submitted prompt
    pub fn prompt(&self) -> &str {
        &self.gateway_request.prompt
    }

    /// Logical name of the target model
    pub fn target_model_name(&self) -> &str {
        self.gateway_request.target_model_name()
    }

    /// Judge model identifier in `name:version` form
    pub fn judge_model_identifier(&self) -> String {
        self.gateway_request.judge_model_identifier()
    }
}

/// A shallow partial update to a [`ProcessedRequest`]
///
/// Serializes only the fields that are set; the state repository merges the
/// resulting object key-by-key over the stored record (last write wins) and
/// stamps `updated_at` itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatePatch {
    /// New lifecycle stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<RequestStage>,
    /// Inference output to record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inference_result: Option<InferenceResult>,
    /// Judge output to record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judge_result: Option<JudgeResult>,
    /// Failure cause to record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl StatePatch {
    /// A patch that only moves the stage
    pub fn stage(stage: RequestStage) -> Self {
        Self {
            stage: Some(stage),
            ..Self::default()
        }
    }

    /// A patch that records the inference output
    pub fn inference_result(result: InferenceResult) -> Self {
        Self {
            inference_result: Some(result),
            ..Self::default()
        }
    }

    /// A patch that completes the request with its judge output
    pub fn completed(result: JudgeResult) -> Self {
        Self {
            stage: Some(RequestStage::Completed),
            judge_result: Some(result),
            ..Self::default()
        }
    }

    /// A patch that fails the request with a cause
    pub fn failed(error_message: impl Into<String>) -> Self {
        Self {
            stage: Some(RequestStage::Failed),
            error_message: Some(error_message.into()),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ApiKey, JudgeModel, TargetModel};

    fn request() -> GatewayRequest {
        GatewayRequest {
            prompt: "What is 2+2?".into(),
            target_model: TargetModel {
                name: "ChatGPT".into(),
            },
            api_key: ApiKey::new("sk-T"),
            judge_model: JudgeModel {
                name: "qwen2.5".into(),
                version: "latest".into(),
            },
        }
    }

    #[test]
    fn test_new_record_starts_at_gateway() {
        let record = ProcessedRequest::new("r-1", request());
        assert_eq!(record.stage, RequestStage::Gateway);
        assert!(record.inference_result.is_none());
        assert!(record.judge_result.is_none());
        assert!(record.error_message.is_none());
        assert_eq!(record.created_at, record.updated_at);
    }

    #[test]
    fn test_record_round_trip() {
        let record = ProcessedRequest::new("r-1", request());
        let json = serde_json::to_string(&record).unwrap();
        let parsed: ProcessedRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_patch_serializes_only_set_fields() {
        let patch = StatePatch::stage(RequestStage::Inference);
        let value = serde_json::to_value(&patch).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 1);
        assert_eq!(object["stage"], "Inference");
    }

    #[test]
    fn test_failed_patch() {
        let patch = StatePatch::failed("Rate limit exceeded");
        assert_eq!(patch.stage, Some(RequestStage::Failed));
        assert_eq!(patch.error_message.as_deref(), Some("Rate limit exceeded"));
        assert!(patch.inference_result.is_none());
    }

    #[test]
    fn test_completed_patch() {
        let result = JudgeResult {
            score: 0.95,
            reasoning: "good".into(),
            categories: None,
            model: "qwen2.5:latest".into(),
            latency_ms: 12.0,
        };
        let patch = StatePatch::completed(result.clone());
        assert_eq!(patch.stage, Some(RequestStage::Completed));
        assert_eq!(patch.judge_result, Some(result));
    }
}
