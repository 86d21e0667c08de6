//! Target-model provider adapters
//!
//! Logical model names map to a closed set of provider families plus a
//! concrete model identifier; adding a provider means extending
//! [`ProviderFamily`] and the table in [`resolve_model`]. Providers are
//! created per request because each submission carries its own API key.

mod google;
mod openai;

use async_trait::async_trait;

pub use google::GoogleProvider;
pub use openai::OpenAiProvider;

use crate::domain::{ApiKey, InferenceResult};

/// Default cap on completion tokens
pub const DEFAULT_MAX_TOKENS: u32 = 4096;
/// Default sampling temperature
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Provider families the pipeline can dispatch to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderFamily {
    /// OpenAI chat-completions API
    OpenAi,
    /// Google Gemini generateContent API
    Google,
}

/// A logical model name resolved to its provider and concrete model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedModel {
    /// Which adapter to use
    pub family: ProviderFamily,
    /// The identifier sent to the provider
    pub model: &'static str,
}

/// Look up a logical model name
///
/// Unknown names fall back to `gpt-4o-mini` on the OpenAI family.
pub fn resolve_model(logical_name: &str) -> ResolvedModel {
    use ProviderFamily::{Google, OpenAi};
    let (family, model) = match logical_name {
        "ChatGPT" => (OpenAi, "gpt-4o-mini"),
        "GPT-4" => (OpenAi, "gpt-4"),
        "GPT-4o" => (OpenAi, "gpt-4o"),
        "GPT-4o-mini" => (OpenAi, "gpt-4o-mini"),
        "Gemini" => (Google, "gemini-2.0-flash"),
        "Gemini-Flash" => (Google, "gemini-2.0-flash"),
        "Gemini-2.5-Flash" => (Google, "gemini-2.5-flash"),
        "Gemini-Pro" => (Google, "gemini-2.5-pro"),
        _ => (OpenAi, "gpt-4o-mini"),
    };
    ResolvedModel { family, model }
}

/// Settings for one inference call
#[derive(Debug, Clone)]
pub struct InferenceOptions {
    /// Concrete model identifier
    pub model: String,
    /// Optional system prompt
    pub system_prompt: Option<String>,
    /// Cap on completion tokens
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
}

impl InferenceOptions {
    /// Default options for a resolved model
    pub fn for_model(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system_prompt: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

/// Errors from a provider call
#[derive(thiserror::Error, Debug)]
pub enum LlmError {
    /// The provider answered with an error status
    #[error("provider returned {status}: {body}")]
    Provider {
        /// HTTP status code
        status: u16,
        /// Response body, usually the provider's error JSON
        body: String,
    },

    /// The provider could not be reached
    #[error("provider transport error: {0}")]
    Transport(String),

    /// The response decoded but carried no usable completion
    #[error("provider response had no completion: {0}")]
    EmptyCompletion(String),

    /// The response could not be decoded
    #[error("provider serialization error: {0}")]
    Serialization(String),
}

/// One target-model backend
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Run a single prompt and capture the response with usage and latency
    async fn generate(
        &self,
        prompt: &str,
        options: &InferenceOptions,
    ) -> Result<InferenceResult, LlmError>;
}

/// Creates providers per request
///
/// A trait rather than a function so workers can be tested against stub
/// targets.
pub trait ProviderFactory: Send + Sync {
    /// Create the adapter for a logical model name with a submission's key
    fn create_provider(
        &self,
        logical_name: &str,
        api_key: &ApiKey,
    ) -> Result<Box<dyn LlmProvider>, LlmError>;

    /// The concrete model identifier behind a logical name
    fn resolve_model_name(&self, logical_name: &str) -> &'static str {
        resolve_model(logical_name).model
    }
}

/// Factory over the real provider adapters
pub struct DefaultProviderFactory;

impl ProviderFactory for DefaultProviderFactory {
    fn create_provider(
        &self,
        logical_name: &str,
        api_key: &ApiKey,
    ) -> Result<Box<dyn LlmProvider>, LlmError> {
        match resolve_model(logical_name).family {
            ProviderFamily::OpenAi => Ok(Box::new(OpenAiProvider::new(api_key)?)),
            ProviderFamily::Google => Ok(Box::new(GoogleProvider::new(api_key)?)),
        }
    }
}
