//! The flattened archive row

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ProcessedRequest, RequestStage};

/// Durable per-request audit record, written once at a terminal stage
///
/// A flattened projection of the final [`ProcessedRequest`]: one row per
/// request, unique on `request_id`, never deleted. Only `Completed` and
/// `Failed` requests are archived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// UUID of the archived request, unique in the archive
    pub request_id: String,
    /// The submitted prompt
    pub prompt: String,
    /// Logical target model name
    pub target_model: String,
    /// Judge model identifier in `name:version` form
    pub judge_model: String,
    /// Target-model response, when inference finished
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inference_response: Option<String>,
    /// Inference latency in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inference_latency_ms: Option<f64>,
    /// Total token count of the inference call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inference_tokens: Option<u32>,
    /// Judge score, when the request was judged
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judge_score: Option<f64>,
    /// Judge reasoning text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judge_reasoning: Option<String>,
    /// Judge per-category scores as JSON
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judge_categories: Option<serde_json::Value>,
    /// Judge latency in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judge_latency_ms: Option<f64>,
    /// Terminal stage: `Completed` or `Failed`
    pub status: RequestStage,
    /// Failure cause, for `Failed` rows
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// When the request was submitted
    pub created_at: DateTime<Utc>,
    /// When the row was built
    pub completed_at: DateTime<Utc>,
}

impl HistoryRecord {
    /// Flatten a terminal state record into an archive row
    ///
    /// `completed_at` is stamped here, at build time.
    pub fn from_state(record: &ProcessedRequest) -> Self {
        let inference = record.inference_result.as_ref();
        let judge = record.judge_result.as_ref();

        Self {
            request_id: record.request_id.clone(),
            prompt: record.prompt().to_string(),
            target_model: record.target_model_name().to_string(),
            judge_model: record.judge_model_identifier(),
            inference_response: inference.map(|r| r.response.clone()),
            inference_latency_ms: inference.map(|r| r.latency_ms),
            inference_tokens: inference.and_then(|r| r.total_tokens),
            judge_score: judge.map(|r| r.score),
            judge_reasoning: judge.map(|r| r.reasoning.clone()),
            judge_categories: judge
                .and_then(|r| r.categories.as_ref())
                .map(|c| serde_json::json!(c)),
            judge_latency_ms: judge.map(|r| r.latency_ms),
            status: record.stage,
            error_message: record.error_message.clone(),
            created_at: record.created_at,
            completed_at: Utc::now(),
        }
    }
}
