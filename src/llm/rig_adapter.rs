//! Bridge from rig's `CompletionModel` trait to our `LlmProvider` trait.

use async_trait::async_trait;
use rig::agent::AgentBuilder;
use rig::completion::{CompletionModel, Prompt};

use crate::error::LlmError;
use crate::llm::provider::{CompletionRequest, LlmProvider};

/// `LlmProvider` backed by any rig completion model.
pub struct RigProvider<M> {
    model: M,
    model_name: String,
}

impl<M> RigProvider<M> {
    pub fn new(model: M, model_name: &str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
        }
    }
}

#[async_trait]
impl<M> LlmProvider for RigProvider<M>
where
    M: CompletionModel + Clone + Send + Sync + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        let agent = AgentBuilder::new(self.model.clone())
            .preamble(&request.system)
            .temperature(request.temperature)
            .max_tokens(request.max_tokens)
            .build();

        let text = agent.prompt(request.prompt).await.map_err(|e| {
            LlmError::RequestFailed {
                provider: self.model_name.clone(),
                reason: e.to_string(),
            }
        })?;

        Ok(text.trim().to_string())
    }
}
