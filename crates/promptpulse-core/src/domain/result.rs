//! Per-stage result types

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Output of a target-model inference call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceResult {
    /// The model's response text
    pub response: String,
    /// Concrete model identifier reported by the provider
    pub model: String,
    /// Wall-clock latency of the provider call in milliseconds
    pub latency_ms: f64,
    /// Prompt token count, when the provider reports usage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u32>,
    /// Completion token count, when the provider reports usage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u32>,
    /// Total token count, when the provider reports usage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u32>,
}

/// Output of a judge evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeResult {
    /// Overall score in `[0, 1]`
    pub score: f64,
    /// Free-text justification for the score
    pub reasoning: String,
    /// Per-category scores (relevance, accuracy, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<HashMap<String, serde_json::Value>>,
    /// Judge model identifier
    pub model: String,
    /// Wall-clock latency of the evaluation in milliseconds
    pub latency_ms: f64,
}
