//! Submission payload types

use serde::{Deserialize, Serialize};

/// Provider API key carried opaquely through the pipeline
///
/// The key has to traverse the broker because the inference worker invokes
/// the provider on the submitter's behalf, so serde emits the raw value.
/// `Debug` and `Display` are redacted; the key must never reach a log line.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wrap a raw key
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Access the raw key for a provider call
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(****)")
    }
}

impl std::fmt::Display for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("****")
    }
}

impl From<&str> for ApiKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

/// The model to evaluate, by logical name (see the provider lookup table)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetModel {
    /// Logical model name, e.g. `"ChatGPT"` or `"Gemini-Flash"`
    pub name: String,
}

/// The model that scores the response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgeModel {
    /// Judge model name, e.g. `"qwen2.5"`
    pub name: String,
    /// Judge model version tag, e.g. `"latest"`
    pub version: String,
}

/// A client submission, immutable after creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayRequest {
    /// The prompt sent to the target model
    pub prompt: String,
    /// Which model to run inference against
    pub target_model: TargetModel,
    /// Provider API key for the target model
    pub api_key: ApiKey,
    /// Which model judges the response
    pub judge_model: JudgeModel,
}

impl GatewayRequest {
    /// Logical name of the target model
    pub fn target_model_name(&self) -> &str {
        &self.target_model.name
    }

    /// Judge model identifier in `name:version` form
    pub fn judge_model_identifier(&self) -> String {
        format!("{}:{}", self.judge_model.name, self.judge_model.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> GatewayRequest {
        GatewayRequest {
            prompt: "What is 2+2?".into(),
            target_model: TargetModel {
                name: "ChatGPT".into(),
            },
            api_key: ApiKey::new("sk-secret"),
            judge_model: JudgeModel {
                name: "qwen2.5".into(),
                version: "latest".into(),
            },
        }
    }

    #[test]
    fn test_api_key_debug_is_redacted() {
        let key = ApiKey::new("sk-very-secret");
        assert_eq!(format!("{:?}", key), "ApiKey(****)");
        assert_eq!(key.to_string(), "****");
    }

    #[test]
    fn test_api_key_serializes_raw_value() {
        // Downstream workers need the key, so the wire form is the raw value.
        let json = serde_json::to_string(&request()).unwrap();
        assert!(json.contains("\"api_key\":\"sk-secret\""));
    }

    #[test]
    fn test_request_debug_is_redacted() {
        let debug = format!("{:?}", request());
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("ApiKey(****)"));
    }

    #[test]
    fn test_judge_model_identifier() {
        assert_eq!(request().judge_model_identifier(), "qwen2.5:latest");
    }

    #[test]
    fn test_request_round_trip() {
        let original = request();
        let json = serde_json::to_string(&original).unwrap();
        let parsed: GatewayRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, original);
        assert_eq!(parsed.api_key.expose(), "sk-secret");
    }
}
