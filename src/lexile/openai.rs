//! LLM-backed Lexile assessment.

use super::LexileAssessor;
use crate::config::Prompts;
use crate::error::{ReadLevelError, Result};
use crate::openai::{create_client, extract_json, is_api_key_configured, preview};
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, instrument};

/// Words sent per request; long chapters are sampled down to this.
const MAX_WORDS_PER_REQUEST: usize = 600;

/// Assessor that asks a chat model for a Lexile estimate.
pub struct OpenAIAssessor {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: String,
    prompts: Prompts,
}

#[derive(Debug, Deserialize)]
struct AssessmentResponse {
    lexile: serde_json::Value,
}

impl OpenAIAssessor {
    pub fn new(model: &str, prompts: Prompts) -> Result<Self> {
        Ok(Self {
            client: create_client()?,
            model: model.to_string(),
            prompts,
        })
    }

    /// Parse `{"lexile": n}`, accepting numbers or numeric strings.
    fn parse_score(response: &str) -> Result<i32> {
        let json = extract_json(response, '{', '}');
        let parsed: AssessmentResponse = serde_json::from_str(json).map_err(|e| {
            ReadLevelError::ExternalService(format!(
                "Unparseable assessment response: {}. Response was: {}",
                e,
                preview(response, 200)
            ))
        })?;

        let score = match &parsed.lexile {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().trim_end_matches('L').parse::<f64>().ok(),
            _ => None,
        };

        score.map(|s| s.round() as i32).ok_or_else(|| {
            ReadLevelError::ExternalService(format!("Assessment returned no score: {}", parsed.lexile))
        })
    }
}

#[async_trait]
impl LexileAssessor for OpenAIAssessor {
    #[instrument(skip(self, words), fields(model = %self.model))]
    async fn assess(&self, words: &[String]) -> Result<i32> {
        let step = (words.len() / MAX_WORDS_PER_REQUEST).max(1);
        let sample: Vec<&str> = words
            .iter()
            .step_by(step)
            .take(MAX_WORDS_PER_REQUEST)
            .map(String::as_str)
            .collect();

        let mut vars = HashMap::new();
        vars.insert("words".to_string(), sample.join(" "));

        let system_message = self.prompts.render_with_custom(&self.prompts.assessment.system, &vars);
        let user_message = self.prompts.render_with_custom(&self.prompts.assessment.user, &vars);

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
            .temperature(0.0)
            .build()
            .map_err(|e| ReadLevelError::OpenAI(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| ReadLevelError::OpenAI(format!("Assessment request failed: {}", e)))?;

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.as_ref())
            .ok_or_else(|| ReadLevelError::ExternalService("Empty assessment response".to_string()))?;

        debug!("Assessment response: {}", preview(content, 200));
        Self::parse_score(content)
    }

    async fn check(&self) -> Result<()> {
        if !is_api_key_configured() {
            return Err(ReadLevelError::ServiceUnavailable(
                "OPENAI_API_KEY is not set; use assessment.provider = \"heuristic\" to run offline".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_score_number() {
        assert_eq!(OpenAIAssessor::parse_score(r#"{"lexile": 640, "confidence": 0.8}"#).unwrap(), 640);
    }

    #[test]
    fn test_parse_score_fenced_string() {
        let response = "```json\n{\"lexile\": \"820L\"}\n```";
        assert_eq!(OpenAIAssessor::parse_score(response).unwrap(), 820);
    }

    #[test]
    fn test_parse_score_missing() {
        assert!(OpenAIAssessor::parse_score(r#"{"lexile": null}"#).is_err());
        assert!(OpenAIAssessor::parse_score("no idea").is_err());
    }
}
