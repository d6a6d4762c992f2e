//! Audio matching for listening materials.
//!
//! A material gets its audio from one of four sources: synthesized speech,
//! a lookup in an existing audio library, or a URL supplied by an editor
//! (uploaded or external).

mod http;

pub use http::{HttpAudioLibrary, HttpSynthesizer};

use crate::error::{ReadLevelError, Result};
use crate::material::{AudioSource, ListeningMaterial};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};

pub const MIN_SPEED: f32 = 0.5;
pub const MAX_SPEED: f32 = 2.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioQuality {
    Low,
    #[default]
    Medium,
    High,
}

impl std::str::FromStr for AudioQuality {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(AudioQuality::Low),
            "medium" => Ok(AudioQuality::Medium),
            "high" => Ok(AudioQuality::High),
            _ => Err(format!("Unknown audio quality: {}. Use low, medium or high.", s)),
        }
    }
}

/// How to obtain audio for a material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub source: AudioSource,
    pub language: String,
    pub voice: String,
    pub speed: f32,
    pub quality: AudioQuality,
    /// Audio location for `upload` and `external` sources.
    pub url: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            source: AudioSource::Tts,
            language: "en".to_string(),
            voice: "female".to_string(),
            speed: 1.0,
            quality: AudioQuality::Medium,
            url: None,
        }
    }
}

impl AudioConfig {
    pub fn validate(&self) -> Result<()> {
        if !(MIN_SPEED..=MAX_SPEED).contains(&self.speed) {
            return Err(ReadLevelError::Validation(format!(
                "Speed must be between {} and {}, got {}",
                MIN_SPEED, MAX_SPEED, self.speed
            )));
        }
        if self.language.trim().is_empty() {
            return Err(ReadLevelError::Validation("Language is empty".to_string()));
        }
        Ok(())
    }
}

/// Result of matching audio to a material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioMatch {
    pub audio_url: String,
    pub audio_source: AudioSource,
    pub confidence: Option<f32>,
}

impl AudioMatch {
    /// Overwrite the material's audio fields with this match.
    pub fn apply_to(&self, material: &mut ListeningMaterial) {
        material.audio_url = Some(self.audio_url.clone());
        material.audio_source = Some(self.audio_source);
        material.match_confidence = self.confidence;
        material.updated_at = chrono::Utc::now();
    }
}

/// Request sent to a speech synthesizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechRequest {
    pub text: String,
    pub language: String,
    pub voice: String,
    pub speed: f32,
    pub quality: AudioQuality,
}

/// Audio located or produced by a collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioHit {
    pub url: String,
    #[serde(default)]
    pub confidence: Option<f32>,
}

/// Text-to-speech collaborator.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, request: &SpeechRequest) -> Result<AudioHit>;
}

/// Pre-recorded audio lookup.
#[async_trait]
pub trait AudioLibrary: Send + Sync {
    /// `Ok(None)` when the library has no recording for `text`.
    async fn lookup(&self, text: &str, language: &str) -> Result<Option<AudioHit>>;
}

/// Resolves audio for materials from the configured collaborators.
#[derive(Clone)]
pub struct AudioMatcher {
    synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
    library: Option<Arc<dyn AudioLibrary>>,
    retry: RetryPolicy,
}

impl AudioMatcher {
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            synthesizer: None,
            library: None,
            retry,
        }
    }

    pub fn with_synthesizer(mut self, synthesizer: Arc<dyn SpeechSynthesizer>) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    pub fn with_library(mut self, library: Arc<dyn AudioLibrary>) -> Self {
        self.library = Some(library);
        self
    }

    /// Fails with `ServiceUnavailable` when the collaborator for `source` is missing.
    pub fn preflight(&self, source: AudioSource) -> Result<()> {
        match source {
            AudioSource::Tts if self.synthesizer.is_none() => Err(ReadLevelError::ServiceUnavailable(
                "No speech synthesizer configured (set tts.endpoint)".to_string(),
            )),
            AudioSource::Library if self.library.is_none() => Err(ReadLevelError::ServiceUnavailable(
                "No audio library configured (set library.endpoint)".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Find or produce audio for `material`.
    #[instrument(skip(self, material, config), fields(material = %material.id, source = %config.source))]
    pub async fn match_material(
        &self,
        material: &ListeningMaterial,
        config: &AudioConfig,
    ) -> Result<AudioMatch> {
        config.validate()?;

        let audio = match config.source {
            AudioSource::Tts => self.synthesize(material, config).await?,
            AudioSource::Library => self.lookup(material, config).await?,
            AudioSource::Upload | AudioSource::External => Self::provided(material, config)?,
        };

        info!(
            "Matched {} audio for '{}' (confidence {:?})",
            audio.audio_source, material.title, audio.confidence
        );
        Ok(audio)
    }

    fn require_content(material: &ListeningMaterial) -> Result<()> {
        if material.content.trim().is_empty() {
            return Err(ReadLevelError::Validation(format!(
                "Material {} has no content",
                material.id
            )));
        }
        Ok(())
    }

    async fn synthesize(&self, material: &ListeningMaterial, config: &AudioConfig) -> Result<AudioMatch> {
        Self::require_content(material)?;
        let Some(synthesizer) = self.synthesizer.as_ref() else {
            return Err(ReadLevelError::ServiceUnavailable(
                "No speech synthesizer configured (set tts.endpoint)".to_string(),
            ));
        };

        let request = SpeechRequest {
            text: material.content.clone(),
            language: config.language.clone(),
            voice: config.voice.clone(),
            speed: config.speed,
            quality: config.quality,
        };
        let hit = self
            .retry
            .run("synthesize", || synthesizer.synthesize(&request))
            .await?;

        Ok(AudioMatch {
            audio_url: hit.url,
            audio_source: AudioSource::Tts,
            confidence: hit.confidence.map(|c| c.clamp(0.0, 1.0)),
        })
    }

    async fn lookup(&self, material: &ListeningMaterial, config: &AudioConfig) -> Result<AudioMatch> {
        Self::require_content(material)?;
        let Some(library) = self.library.as_ref() else {
            return Err(ReadLevelError::ServiceUnavailable(
                "No audio library configured (set library.endpoint)".to_string(),
            ));
        };

        let hit = self
            .retry
            .run("library lookup", || library.lookup(&material.content, &config.language))
            .await?
            .ok_or_else(|| {
                ReadLevelError::NotFound(format!("No library audio for '{}'", material.title))
            })?;

        Ok(AudioMatch {
            audio_url: hit.url,
            audio_source: AudioSource::Library,
            confidence: hit.confidence.map(|c| c.clamp(0.0, 1.0)),
        })
    }

    fn provided(material: &ListeningMaterial, config: &AudioConfig) -> Result<AudioMatch> {
        let raw = config
            .url
            .as_deref()
            .or(material.audio_url.as_deref())
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| {
                ReadLevelError::Validation(format!(
                    "A URL is required for {} audio",
                    config.source
                ))
            })?;

        let url = url::Url::parse(raw.trim())
            .map_err(|e| ReadLevelError::Validation(format!("Invalid audio URL '{}': {}", raw, e)))?;

        Ok(AudioMatch {
            audio_url: url.to_string(),
            audio_source: config.source,
            confidence: Some(1.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    struct FakeSynthesizer {
        confidence: Option<f32>,
        failures: u32,
        calls: AtomicU32,
        last: Mutex<Option<SpeechRequest>>,
    }

    impl FakeSynthesizer {
        fn new(confidence: Option<f32>, failures: u32) -> Self {
            Self {
                confidence,
                failures,
                calls: AtomicU32::new(0),
                last: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl SpeechSynthesizer for FakeSynthesizer {
        async fn synthesize(&self, request: &SpeechRequest) -> Result<AudioHit> {
            *self.last.lock().unwrap() = Some(request.clone());
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(ReadLevelError::ExternalService("tts timeout".into()));
            }
            Ok(AudioHit {
                url: "https://tts.example.com/a.mp3".into(),
                confidence: self.confidence,
            })
        }
    }

    struct FakeLibrary {
        hit: bool,
    }

    #[async_trait]
    impl AudioLibrary for FakeLibrary {
        async fn lookup(&self, _text: &str, language: &str) -> Result<Option<AudioHit>> {
            Ok(self.hit.then(|| AudioHit {
                url: format!("https://library.example.com/{}/1.mp3", language),
                confidence: Some(0.82),
            }))
        }
    }

    fn retry() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1), 3)
    }

    fn material() -> ListeningMaterial {
        ListeningMaterial::new("Morning", "The sun comes up. Birds sing.")
    }

    #[tokio::test]
    async fn test_tts_match_passes_options_and_clamps_confidence() {
        let synth = Arc::new(FakeSynthesizer::new(Some(1.4), 1));
        let matcher = AudioMatcher::new(retry()).with_synthesizer(synth.clone());
        let config = AudioConfig {
            voice: "male".into(),
            speed: 0.8,
            quality: AudioQuality::High,
            ..Default::default()
        };

        let matched = matcher.match_material(&material(), &config).await.unwrap();

        assert_eq!(matched.audio_source, AudioSource::Tts);
        assert_eq!(matched.confidence, Some(1.0));
        assert_eq!(synth.calls.load(Ordering::SeqCst), 2);
        let request = synth.last.lock().unwrap().clone().unwrap();
        assert_eq!(request.voice, "male");
        assert_eq!(request.quality, AudioQuality::High);
    }

    #[tokio::test]
    async fn test_tts_without_synthesizer_is_unavailable() {
        let matcher = AudioMatcher::new(retry());
        let result = matcher.match_material(&material(), &AudioConfig::default()).await;
        assert!(matches!(result, Err(ReadLevelError::ServiceUnavailable(_))));
    }

    #[tokio::test]
    async fn test_speed_out_of_range() {
        let matcher = AudioMatcher::new(retry()).with_synthesizer(Arc::new(FakeSynthesizer::new(None, 0)));
        let config = AudioConfig {
            speed: 3.0,
            ..Default::default()
        };
        let result = matcher.match_material(&material(), &config).await;
        assert!(matches!(result, Err(ReadLevelError::Validation(_))));
    }

    #[tokio::test]
    async fn test_library_hit_and_miss() {
        let config = AudioConfig {
            source: AudioSource::Library,
            language: "en-GB".into(),
            ..Default::default()
        };

        let hit = AudioMatcher::new(retry())
            .with_library(Arc::new(FakeLibrary { hit: true }))
            .match_material(&material(), &config)
            .await
            .unwrap();
        assert_eq!(hit.audio_url, "https://library.example.com/en-GB/1.mp3");
        assert_eq!(hit.confidence, Some(0.82));

        let miss = AudioMatcher::new(retry())
            .with_library(Arc::new(FakeLibrary { hit: false }))
            .match_material(&material(), &config)
            .await;
        assert!(matches!(miss, Err(ReadLevelError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_external_url_validated() {
        let matcher = AudioMatcher::new(retry());
        let config = AudioConfig {
            source: AudioSource::External,
            url: Some("https://cdn.example.com/story.mp3".into()),
            ..Default::default()
        };
        let matched = matcher.match_material(&material(), &config).await.unwrap();
        assert_eq!(matched.confidence, Some(1.0));
        assert_eq!(matched.audio_source, AudioSource::External);

        let bad = AudioConfig {
            url: Some("not a url".into()),
            ..config.clone()
        };
        assert!(matches!(
            matcher.match_material(&material(), &bad).await,
            Err(ReadLevelError::Validation(_))
        ));

        let missing = AudioConfig { url: None, ..config };
        assert!(matches!(
            matcher.match_material(&material(), &missing).await,
            Err(ReadLevelError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_upload_falls_back_to_existing_url() {
        let mut m = material();
        m.audio_url = Some("https://files.example.com/up.mp3".into());
        let config = AudioConfig {
            source: AudioSource::Upload,
            ..Default::default()
        };
        let matched = AudioMatcher::new(retry()).match_material(&m, &config).await.unwrap();
        assert_eq!(matched.audio_url, "https://files.example.com/up.mp3");
    }

    #[test]
    fn test_apply_overwrites_previous_match() {
        let mut m = material();
        m.audio_url = Some("https://old.example.com/a.mp3".into());
        m.audio_source = Some(AudioSource::Library);
        m.match_confidence = Some(0.4);

        AudioMatch {
            audio_url: "https://new.example.com/b.mp3".into(),
            audio_source: AudioSource::Tts,
            confidence: None,
        }
        .apply_to(&mut m);

        assert_eq!(m.audio_url.as_deref(), Some("https://new.example.com/b.mp3"));
        assert_eq!(m.audio_source, Some(AudioSource::Tts));
        assert_eq!(m.match_confidence, None);
    }
}
