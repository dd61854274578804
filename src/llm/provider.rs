//! Model provider abstraction.

use async_trait::async_trait;

use crate::error::LlmError;

/// A single completion request — system preamble plus user prompt.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub max_tokens: u64,
    pub temperature: f64,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
            max_tokens: 256,
            temperature: 0.7,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Trait for model providers.
///
/// Absence of a provider is represented by `Option<Arc<dyn LlmProvider>>`
/// at the call sites — callers treat `None` as "use the deterministic
/// fallback", never as an error.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Model identifier, for logging.
    fn model_name(&self) -> &str;

    /// Run a completion and return the trimmed text.
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError>;
}
