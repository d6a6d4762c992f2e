//! OpenAI client configuration with sensible defaults.

use crate::error::{ReadLevelError, Result};
use async_openai::{config::OpenAIConfig, Client};
use std::time::Duration;

/// Default timeout for OpenAI API requests (2 minutes).
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Create an OpenAI client with the default timeout.
pub fn create_client() -> Result<Client<OpenAIConfig>> {
    create_client_with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
}

/// Create an OpenAI client with a custom timeout.
pub fn create_client_with_timeout(timeout: Duration) -> Result<Client<OpenAIConfig>> {
    let http_client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ReadLevelError::Config(format!("Failed to create HTTP client: {}", e)))?;

    Ok(Client::with_config(OpenAIConfig::default()).with_http_client(http_client))
}

/// Whether an API key is available in the environment.
pub fn is_api_key_configured() -> bool {
    std::env::var("OPENAI_API_KEY").is_ok_and(|k| !k.is_empty())
}

/// Extract a JSON payload from a chat response that may wrap it in prose
/// or a fenced code block.
pub fn extract_json<'a>(response: &'a str, open: char, close: char) -> &'a str {
    match (response.find(open), response.rfind(close)) {
        (Some(start), Some(end)) if end > start => &response[start..=end],
        _ => response.trim(),
    }
}

/// At most `max_chars` characters of `text`, for log and error messages.
pub fn preview(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_respects_char_boundaries() {
        assert_eq!(preview("héllo", 2), "hé");
        assert_eq!(preview("short", 50), "short");
    }

    #[test]
    fn test_extract_json_from_fenced_block() {
        let response = "Here you go:\n```json\n{\"lexile\": 640}\n```\n";
        assert_eq!(extract_json(response, '{', '}'), "{\"lexile\": 640}");
    }

    #[test]
    fn test_extract_json_passthrough() {
        assert_eq!(extract_json("  [1, 2] ", '[', ']'), "[1, 2]");
        assert_eq!(extract_json(" nothing ", '[', ']'), "nothing");
    }
}
