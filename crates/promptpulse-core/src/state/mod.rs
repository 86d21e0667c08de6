//! Ephemeral per-request state
//!
//! The state store is the pipeline's coordination medium: one short-TTL
//! record per request, created at submission and mutated by whichever worker
//! currently owns the request's message. Updates are shallow merges with
//! last-write-wins semantics, which is tolerable because at-least-once
//! delivery makes each stage transition effectively single-writer. The
//! durable record of truth is the archive, not this store.

mod memory;
mod redis;

use async_trait::async_trait;
use chrono::Utc;

pub use memory::InMemoryStateRepository;
pub use redis::RedisStateRepository;

use crate::domain::{ProcessedRequest, StatePatch};

/// Key prefix for state records
const KEY_PREFIX: &str = "request:";

/// Storage key for a request id
pub fn state_key(request_id: &str) -> String {
    format!("{KEY_PREFIX}{request_id}")
}

/// Errors from the state store
#[derive(thiserror::Error, Debug)]
pub enum StateError {
    /// The backend call failed
    #[error("state store error: {0}")]
    Backend(String),

    /// A stored record could not be decoded
    #[error("state serialization error: {0}")]
    Serialization(String),
}

/// TTL-bounded key/value store for [`ProcessedRequest`] records
#[async_trait]
pub trait StateRepository: Send + Sync {
    /// Store a fresh record with the configured TTL
    ///
    /// Duplicate ids are not detected; UUID v4 collisions are assumed
    /// impossible.
    async fn create(
        &self,
        request_id: &str,
        record: &ProcessedRequest,
    ) -> Result<ProcessedRequest, StateError>;

    /// Fetch a record; `None` when unknown or expired
    async fn get(&self, request_id: &str) -> Result<Option<ProcessedRequest>, StateError>;

    /// Shallow-merge a patch over the stored record
    ///
    /// Refreshes `updated_at` and writes back preserving the remaining TTL;
    /// a non-positive or unreadable TTL falls back to the default. Returns
    /// `None` when the record is unknown or expired.
    async fn update(
        &self,
        request_id: &str,
        patch: &StatePatch,
    ) -> Result<Option<ProcessedRequest>, StateError>;

    /// Remove a record; `true` when something was deleted
    async fn delete(&self, request_id: &str) -> Result<bool, StateError>;

    /// Whether the backend answers a liveness probe
    async fn is_healthy(&self) -> bool;
}

/// Merge a patch over a stored record's JSON, refreshing `updated_at`
///
/// Shared by the backends so their merge semantics cannot drift.
fn merge_record(stored: &str, patch: &StatePatch) -> Result<(String, ProcessedRequest), StateError> {
    let mut value: serde_json::Value =
        serde_json::from_str(stored).map_err(|e| StateError::Serialization(e.to_string()))?;
    let object = value
        .as_object_mut()
        .ok_or_else(|| StateError::Serialization("stored record is not an object".into()))?;

    let patch_value =
        serde_json::to_value(patch).map_err(|e| StateError::Serialization(e.to_string()))?;
    if let serde_json::Value::Object(fields) = patch_value {
        for (key, field) in fields {
            object.insert(key, field);
        }
    }
    object.insert(
        "updated_at".to_string(),
        serde_json::to_value(Utc::now()).map_err(|e| StateError::Serialization(e.to_string()))?,
    );

    let record: ProcessedRequest =
        serde_json::from_value(value.clone()).map_err(|e| StateError::Serialization(e.to_string()))?;
    let payload =
        serde_json::to_string(&value).map_err(|e| StateError::Serialization(e.to_string()))?;
    Ok((payload, record))
}

/// Serialize a record for storage
fn encode_record(record: &ProcessedRequest) -> Result<String, StateError> {
    serde_json::to_string(record).map_err(|e| StateError::Serialization(e.to_string()))
}

/// Decode a stored record
fn decode_record(payload: &str) -> Result<ProcessedRequest, StateError> {
    serde_json::from_str(payload).map_err(|e| StateError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        ApiKey, GatewayRequest, InferenceResult, JudgeModel, RequestStage, TargetModel,
    };

    fn record() -> ProcessedRequest {
        ProcessedRequest::new(
            "r-1",
            GatewayRequest {
                prompt: "p".into(),
                target_model: TargetModel {
                    name: "ChatGPT".into(),
                },
                api_key: ApiKey::new("sk-T"),
                judge_model: JudgeModel {
                    name: "qwen2.5".into(),
                    version: "latest".into(),
                },
            },
        )
    }

    #[test]
    fn test_state_key() {
        assert_eq!(state_key("u-1"), "request:u-1");
    }

    #[test]
    fn test_merge_applies_patch_fields() {
        let stored = encode_record(&record()).unwrap();
        let patch = StatePatch::stage(RequestStage::Inference);

        let (_, merged) = merge_record(&stored, &patch).unwrap();
        assert_eq!(merged.stage, RequestStage::Inference);
        // Untouched fields survive the merge.
        assert_eq!(merged.prompt(), "p");
        assert_eq!(merged.gateway_request.api_key.expose(), "sk-T");
    }

    #[test]
    fn test_merge_refreshes_updated_at() {
        let original = record();
        let stored = encode_record(&original).unwrap();

        let (_, merged) =
            merge_record(&stored, &StatePatch::stage(RequestStage::Inference)).unwrap();
        assert!(merged.updated_at >= original.updated_at);
        assert_eq!(merged.created_at, original.created_at);
    }

    #[test]
    fn test_merge_is_shallow_and_last_write_wins() {
        let stored = encode_record(&record()).unwrap();
        let first = StatePatch::inference_result(InferenceResult {
            response: "first".into(),
            model: "m".into(),
            latency_ms: 1.0,
            prompt_tokens: None,
            completion_tokens: None,
            total_tokens: Some(7),
        });
        let second = StatePatch::inference_result(InferenceResult {
            response: "second".into(),
            model: "m".into(),
            latency_ms: 2.0,
            prompt_tokens: None,
            completion_tokens: None,
            total_tokens: None,
        });

        let (payload, _) = merge_record(&stored, &first).unwrap();
        let (_, merged) = merge_record(&payload, &second).unwrap();

        let result = merged.inference_result.unwrap();
        assert_eq!(result.response, "second");
        // Whole-field replacement: the second write's absent tokens win.
        assert_eq!(result.total_tokens, None);
    }

    #[test]
    fn test_merge_rejects_non_object() {
        let result = merge_record("[1,2]", &StatePatch::default());
        assert!(matches!(result, Err(StateError::Serialization(_))));
    }
}
