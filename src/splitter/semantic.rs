//! LLM-based topic segmentation.
//!
//! Numbers the paragraphs of a book, asks the model which paragraphs open a
//! new section, and maps those indices back to byte offsets.

use super::units::paragraphs;
use super::TopicSegmenter;
use crate::config::Prompts;
use crate::error::{ReadLevelError, Result};
use crate::openai::{create_client, extract_json, preview};
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{debug, info, instrument};

/// Characters of each paragraph shown to the model.
const PARAGRAPH_PREVIEW_CHARS: usize = 240;

/// Topic segmenter backed by a chat model.
pub struct OpenAISegmenter {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: String,
    prompts: Prompts,
}

impl OpenAISegmenter {
    pub fn new(model: &str, prompts: Prompts) -> Result<Self> {
        Ok(Self {
            client: create_client()?,
            model: model.to_string(),
            prompts,
        })
    }

    /// Byte offset of each paragraph within `text`.
    fn paragraph_offsets<'a>(text: &'a str) -> Vec<(usize, &'a str)> {
        let base = text.as_ptr() as usize;
        paragraphs(text)
            .into_iter()
            .map(|p| (p.as_ptr() as usize - base, p))
            .collect()
    }

    fn numbered_listing(paragraphs: &[(usize, &str)]) -> String {
        paragraphs
            .iter()
            .enumerate()
            .map(|(i, (_, p))| {
                let preview: String = p.chars().take(PARAGRAPH_PREVIEW_CHARS).collect();
                format!("[{}] {}", i, preview.replace('\n', " "))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Parse a JSON array of paragraph indices.
    fn parse_indices(response: &str) -> Result<Vec<usize>> {
        let json = extract_json(response, '[', ']');
        serde_json::from_str(json).map_err(|e| {
            ReadLevelError::ExternalService(format!(
                "Failed to parse segmentation response: {}. Response was: {}",
                e,
                preview(response, 300)
            ))
        })
    }

    fn indices_to_offsets(indices: Vec<usize>, paragraphs: &[(usize, &str)]) -> Vec<usize> {
        indices
            .into_iter()
            .filter_map(|i| paragraphs.get(i).map(|(offset, _)| *offset))
            .collect()
    }
}

#[async_trait]
impl TopicSegmenter for OpenAISegmenter {
    #[instrument(skip(self, text), fields(model = %self.model))]
    async fn segment(&self, text: &str) -> Result<Vec<usize>> {
        let paragraphs = Self::paragraph_offsets(text);
        if paragraphs.len() < 2 {
            return Ok(Vec::new());
        }

        let mut vars = HashMap::new();
        vars.insert("paragraphs".to_string(), Self::numbered_listing(&paragraphs));

        let system_message = self.prompts.render_with_custom(&self.prompts.segmentation.system, &vars);
        let user_message = self.prompts.render_with_custom(&self.prompts.segmentation.user, &vars);

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
            .temperature(0.2)
            .build()
            .map_err(|e| ReadLevelError::OpenAI(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| ReadLevelError::OpenAI(format!("Segmentation request failed: {}", e)))?;

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.as_ref())
            .ok_or_else(|| ReadLevelError::ExternalService("Empty segmentation response".to_string()))?;

        debug!("Segmentation response: {}", preview(content, 300));

        let offsets = Self::indices_to_offsets(Self::parse_indices(content)?, &paragraphs);
        info!("Segmenter proposed {} section starts", offsets.len());
        Ok(offsets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paragraph_offsets_point_into_text() {
        let text = "First.\n\n  Second.\n\nThird.";
        let offsets = OpenAISegmenter::paragraph_offsets(text);
        assert_eq!(offsets.len(), 3);
        for (offset, p) in &offsets {
            assert!(text[*offset..].starts_with(p));
        }
    }

    #[test]
    fn test_parse_indices_with_prose() {
        let response = "Sections start at:\n```json\n[0, 3, 7]\n```";
        assert_eq!(OpenAISegmenter::parse_indices(response).unwrap(), vec![0, 3, 7]);
    }

    #[test]
    fn test_out_of_range_indices_dropped() {
        let text = "A.\n\nB.\n\nC.";
        let paragraphs = OpenAISegmenter::paragraph_offsets(text);
        let offsets = OpenAISegmenter::indices_to_offsets(vec![0, 2, 9], &paragraphs);
        assert_eq!(offsets, vec![0, text.find("C.").unwrap()]);
    }
}
