//! Pre-flight checks before expensive operations.
//!
//! Validates that required credentials and endpoints are configured
//! before starting operations that would otherwise fail midway.

use crate::config::{AssessmentProvider, Settings};
use crate::error::{ReadLevelError, Result};
use crate::material::AudioSource;

/// Requirements for different operations.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// Splitting needs an API key only for topic segmentation.
    Split { semantic: bool },
    /// Rewriting needs an API key; estimating may too.
    Generate { estimates: bool },
    /// Estimation depends on the assessment provider.
    Estimate,
    /// Audio matching needs the endpoint for its source.
    MatchAudio(AudioSource),
}

/// Run pre-flight checks for the given operation.
///
/// Returns Ok(()) if all checks pass, or an error describing what's missing.
pub fn check(operation: Operation, settings: &Settings) -> Result<()> {
    match operation {
        Operation::Split { semantic } => {
            if semantic && settings.splitting.semantic_enabled {
                check_api_key()?;
            }
        }
        Operation::Generate { estimates } => {
            check_api_key()?;
            if estimates {
                check_assessment(settings)?;
            }
        }
        Operation::Estimate => check_assessment(settings)?,
        Operation::MatchAudio(AudioSource::Tts) => {
            check_endpoint("tts.endpoint", settings.tts.endpoint.as_deref())?;
        }
        Operation::MatchAudio(AudioSource::Library) => {
            check_endpoint("library.endpoint", settings.library.endpoint.as_deref())?;
        }
        Operation::MatchAudio(_) => {
            // Upload and external audio carry their own URL
        }
    }
    Ok(())
}

fn check_assessment(settings: &Settings) -> Result<()> {
    match settings.assessment.provider {
        AssessmentProvider::OpenAI => check_api_key(),
        AssessmentProvider::Heuristic => Ok(()),
    }
}

/// Check if OpenAI API key is configured.
fn check_api_key() -> Result<()> {
    match std::env::var("OPENAI_API_KEY") {
        Ok(key) if !key.is_empty() => Ok(()),
        Ok(_) => Err(ReadLevelError::Config(
            "OPENAI_API_KEY is empty. Set it with: export OPENAI_API_KEY='sk-...'".to_string(),
        )),
        Err(_) => Err(ReadLevelError::Config(
            "OPENAI_API_KEY not set. Set it with: export OPENAI_API_KEY='sk-...'".to_string(),
        )),
    }
}

/// Check an endpoint is set and parses as a URL.
fn check_endpoint(key: &str, endpoint: Option<&str>) -> Result<()> {
    let endpoint = endpoint.ok_or_else(|| {
        ReadLevelError::Config(format!("{} is not set. Add it to the config file.", key))
    })?;
    url::Url::parse(endpoint)
        .map(|_| ())
        .map_err(|e| ReadLevelError::Config(format!("{} is not a valid URL ({}): {}", key, endpoint, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_audio_has_no_requirements() {
        let settings = Settings::default();
        assert!(check(Operation::MatchAudio(AudioSource::External), &settings).is_ok());
        assert!(check(Operation::Split { semantic: false }, &settings).is_ok());
    }

    #[test]
    fn test_tts_endpoint_required() {
        let mut settings = Settings::default();
        assert!(check(Operation::MatchAudio(AudioSource::Tts), &settings).is_err());

        settings.tts.endpoint = Some("https://tts.example.com/v1/speech".into());
        assert!(check(Operation::MatchAudio(AudioSource::Tts), &settings).is_ok());

        settings.tts.endpoint = Some("nowhere".into());
        assert!(check(Operation::MatchAudio(AudioSource::Tts), &settings).is_err());
    }

    #[test]
    fn test_heuristic_estimate_offline() {
        let mut settings = Settings::default();
        settings.assessment.provider = AssessmentProvider::Heuristic;
        assert!(check(Operation::Estimate, &settings).is_ok());
    }
}
