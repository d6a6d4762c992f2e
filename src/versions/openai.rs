//! Chat-model rewriter.

use super::Rewriter;
use crate::config::Prompts;
use crate::error::{ReadLevelError, Result};
use crate::openai::{create_client, is_api_key_configured};
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{debug, instrument};

pub struct OpenAIRewriter {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: String,
    temperature: f32,
    prompts: Prompts,
}

impl OpenAIRewriter {
    pub fn new(model: &str, temperature: f32, prompts: Prompts) -> Result<Self> {
        Ok(Self {
            client: create_client()?,
            model: model.to_string(),
            temperature,
            prompts,
        })
    }

    fn target_hint(target_lexile: Option<i32>) -> String {
        match target_lexile {
            Some(target) => format!("Aim for a Lexile measure of about {}L.", target),
            None => String::new(),
        }
    }

    /// Drop a leading "Here is..." line or code fence some models add.
    fn strip_wrapper(response: &str) -> &str {
        let trimmed = response.trim();
        let trimmed = trimmed
            .strip_prefix("```text")
            .or_else(|| trimmed.strip_prefix("```"))
            .and_then(|s| s.strip_suffix("```"))
            .unwrap_or(trimmed);
        trimmed.trim()
    }
}

#[async_trait]
impl Rewriter for OpenAIRewriter {
    #[instrument(skip(self, text), fields(model = %self.model, len = text.len()))]
    async fn rewrite(&self, text: &str, difficulty: u8, target_lexile: Option<i32>) -> Result<String> {
        let mut vars = HashMap::new();
        vars.insert("difficulty".to_string(), difficulty.to_string());
        vars.insert("target_hint".to_string(), Self::target_hint(target_lexile));
        vars.insert("content".to_string(), text.to_string());

        let system_message = self.prompts.render_with_custom(&self.prompts.rewrite.system, &vars);
        let user_message = self.prompts.render_with_custom(&self.prompts.rewrite.user, &vars);

        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system_message)
                .build()
                .map_err(|e| ReadLevelError::OpenAI(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(user_message)
                .build()
                .map_err(|e| ReadLevelError::OpenAI(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(self.temperature)
            .build()
            .map_err(|e| ReadLevelError::OpenAI(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| ReadLevelError::OpenAI(format!("Rewrite request failed: {}", e)))?;

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.as_ref())
            .ok_or_else(|| ReadLevelError::ExternalService("Empty rewrite response".to_string()))?;

        debug!("Rewrite returned {} chars", content.len());
        Ok(Self::strip_wrapper(content).to_string())
    }

    async fn check(&self) -> Result<()> {
        if !is_api_key_configured() {
            return Err(ReadLevelError::ServiceUnavailable("OPENAI_API_KEY is not set".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_hint() {
        assert_eq!(OpenAIRewriter::target_hint(None), "");
        assert!(OpenAIRewriter::target_hint(Some(550)).contains("550L"));
    }

    #[test]
    fn test_strip_wrapper() {
        assert_eq!(OpenAIRewriter::strip_wrapper("```\nThe cat sat.\n```"), "The cat sat.");
        assert_eq!(OpenAIRewriter::strip_wrapper("```text\nA dog.\n```"), "A dog.");
        assert_eq!(OpenAIRewriter::strip_wrapper("  Plain text. "), "Plain text.");
    }
}
