//! Google Gemini adapter

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{ApiKey, InferenceResult};

use super::{InferenceOptions, LlmError, LlmProvider};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
}

impl<'a> GenerateRequest<'a> {
    fn build(prompt: &'a str, options: &'a InferenceOptions) -> Self {
        Self {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                max_output_tokens: options.max_tokens,
                temperature: options.temperature,
            },
            system_instruction: options.system_prompt.as_deref().map(|text| Content {
                parts: vec![Part { text }],
            }),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Deserialize)]
struct ResponseContent {
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: String,
}

#[derive(Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<u32>,
    candidates_token_count: Option<u32>,
    total_token_count: Option<u32>,
}

impl GenerateResponse {
    fn completion_text(self) -> Option<String> {
        let text: String = self
            .candidates?
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .map(|part| part.text)
            .collect();
        (!text.is_empty()).then_some(text)
    }
}

/// Adapter for the Gemini generateContent API
pub struct GoogleProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GoogleProvider {
    /// Create an adapter against the public API
    pub fn new(api_key: &ApiKey) -> Result<Self, LlmError> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Create an adapter against a custom endpoint
    pub fn with_base_url(api_key: &ApiKey, base_url: impl Into<String>) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| LlmError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            api_key: api_key.expose().to_string(),
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl LlmProvider for GoogleProvider {
    async fn generate(
        &self,
        prompt: &str,
        options: &InferenceOptions,
    ) -> Result<InferenceResult, LlmError> {
        let request = GenerateRequest::build(prompt, options);

        let started = Instant::now();
        let response = self
            .client
            .post(format!(
                "{}/models/{}:generateContent",
                self.base_url, options.model
            ))
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        if !response.status().is_success() {
            return Err(LlmError::Provider {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let generated: GenerateResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Serialization(e.to_string()))?;

        let usage = generated.usage_metadata.clone();
        if usage.is_none() {
            tracing::warn!(model = %options.model, "Usage metadata was not provided");
        }
        let text = generated
            .completion_text()
            .ok_or_else(|| LlmError::EmptyCompletion("no candidates returned".into()))?;

        Ok(InferenceResult {
            response: text,
            // Gemini does not echo the model; report what was requested.
            model: options.model.clone(),
            latency_ms,
            prompt_tokens: usage.as_ref().and_then(|u| u.prompt_token_count),
            completion_tokens: usage.as_ref().and_then(|u| u.candidates_token_count),
            total_tokens: usage.as_ref().and_then(|u| u.total_token_count),
        })
    }
}
