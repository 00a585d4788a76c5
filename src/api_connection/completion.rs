use async_trait::async_trait;

use super::connection::ApiConnectionError;
use super::endpoints::{ChatCompletionRequest, ChatMessage, Provider, ResponseFormat};
use crate::config::ProviderConfig;
use crate::conversation::Message;

/// Black-box text generator. Output is expected, not guaranteed, to hold the
/// JSON payload the instruction asks for.
#[async_trait]
pub trait TextCompletionService: Send + Sync {
    async fn complete(
        &self,
        system_instruction: &str,
        conversation: &[Message],
    ) -> Result<String, ApiConnectionError>;
}

pub struct OpenRouterCompletion {
    provider: Provider,
    config: ProviderConfig,
}

impl OpenRouterCompletion {
    pub fn new(config: ProviderConfig) -> Self {
        let provider = Provider::openrouter_at(&config.api_key_env_var, &config.base_url);
        Self { provider, config }
    }

    pub fn build_request(&self, system_instruction: &str, conversation: &[Message]) -> ChatCompletionRequest {
        let mut messages = Vec::with_capacity(conversation.len() + 1);
        messages.push(ChatMessage::new("system", system_instruction));
        messages.extend(
            conversation
                .iter()
                .map(|m| ChatMessage::new(m.role.as_str(), m.content.clone())),
        );

        ChatCompletionRequest {
            model: self.config.model.clone(),
            messages,
            response_format: self.config.json_mode.then(ResponseFormat::json_object),
            temperature: Some(self.config.temperature),
            max_tokens: Some(self.config.max_tokens),
        }
    }
}

#[async_trait]
impl TextCompletionService for OpenRouterCompletion {
    async fn complete(
        &self,
        system_instruction: &str,
        conversation: &[Message],
    ) -> Result<String, ApiConnectionError> {
        let request = self.build_request(system_instruction, conversation);
        let response = self.provider.call_chat_completion(&request).await?;
        response
            .first_content()
            .map(str::to_string)
            .ok_or(ApiConnectionError::EmptyCompletion)
    }
}
