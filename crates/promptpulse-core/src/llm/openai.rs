//! OpenAI chat-completions adapter

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{ApiKey, InferenceResult};

use super::{InferenceOptions, LlmError, LlmProvider};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

impl<'a> ChatRequest<'a> {
    fn build(prompt: &'a str, options: &'a InferenceOptions) -> Self {
        let mut messages = Vec::with_capacity(2);
        if let Some(system_prompt) = &options.system_prompt {
            messages.push(ChatMessage {
                role: "system",
                content: system_prompt,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        Self {
            model: &options.model,
            messages,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
        }
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    model: String,
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

/// Adapter for the OpenAI chat-completions API
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiProvider {
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
impl LlmProvider for OpenAiProvider {
    async fn generate(
        &self,
        prompt: &str,
        options: &InferenceOptions,
    ) -> Result<InferenceResult, LlmError> {
        let request = ChatRequest::build(prompt, options);

        let started = Instant::now();
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
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

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Serialization(e.to_string()))?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmError::EmptyCompletion("no choices returned".into()))?;

        Ok(InferenceResult {
            response: content,
            model: chat.model,
            latency_ms,
            prompt_tokens: chat.usage.as_ref().map(|u| u.prompt_tokens),
            completion_tokens: chat.usage.as_ref().map(|u| u.completion_tokens),
            total_tokens: chat.usage.as_ref().map(|u| u.total_tokens),
        })
    }
}
