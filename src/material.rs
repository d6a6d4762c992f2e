//! Listening materials.

use crate::error::{ReadLevelError, Result};
use crate::versions::validate_difficulty;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a material's audio came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioSource {
    #[default]
    Tts,
    Library,
    Upload,
    External,
}

impl std::fmt::Display for AudioSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioSource::Tts => write!(f, "tts"),
            AudioSource::Library => write!(f, "library"),
            AudioSource::Upload => write!(f, "upload"),
            AudioSource::External => write!(f, "external"),
        }
    }
}

impl std::str::FromStr for AudioSource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tts" => Ok(AudioSource::Tts),
            "library" => Ok(AudioSource::Library),
            "upload" => Ok(AudioSource::Upload),
            "external" => Ok(AudioSource::External),
            _ => Err(format!("Unknown audio source: {}. Use tts, library, upload or external.", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl std::fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReviewStatus::Pending => write!(f, "pending"),
            ReviewStatus::Approved => write!(f, "approved"),
            ReviewStatus::Rejected => write!(f, "rejected"),
        }
    }
}

impl std::str::FromStr for ReviewStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReviewStatus::Pending),
            "approved" => Ok(ReviewStatus::Approved),
            "rejected" => Ok(ReviewStatus::Rejected),
            _ => Err(format!("Unknown review status: {}", s)),
        }
    }
}

/// A short text with optional audio, subject to editorial review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListeningMaterial {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub category: Option<String>,
    pub difficulty: Option<u8>,
    pub tags: Vec<String>,
    pub audio_url: Option<String>,
    pub audio_source: Option<AudioSource>,
    /// 0.0-1.0
    pub match_confidence: Option<f32>,
    pub review_status: ReviewStatus,
    pub updated_at: DateTime<Utc>,
}

impl ListeningMaterial {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            content: content.into(),
            category: None,
            difficulty: None,
            tags: Vec::new(),
            audio_url: None,
            audio_source: None,
            match_confidence: None,
            review_status: ReviewStatus::Pending,
            updated_at: Utc::now(),
        }
    }
}

/// Fields accepted when creating a material.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewMaterial {
    pub title: String,
    pub content: String,
    pub category: Option<String>,
    pub difficulty: Option<u8>,
    pub tags: Vec<String>,
    pub audio_url: Option<String>,
    pub audio_source: Option<AudioSource>,
}

impl NewMaterial {
    pub fn into_material(self) -> Result<ListeningMaterial> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(ReadLevelError::Validation("Material title is empty".to_string()));
        }
        if self.content.trim().is_empty() {
            return Err(ReadLevelError::Validation("Material content is empty".to_string()));
        }
        if let Some(difficulty) = self.difficulty {
            validate_difficulty(difficulty)?;
        }

        let mut material = ListeningMaterial::new(title, self.content);
        material.category = self.category.filter(|c| !c.trim().is_empty());
        material.difficulty = self.difficulty;
        material.tags = self
            .tags
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if let Some(url) = self.audio_url.filter(|u| !u.trim().is_empty()) {
            material.audio_source = Some(self.audio_source.unwrap_or(AudioSource::External));
            material.audio_url = Some(url);
        }
        Ok(material)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_material_validation() {
        let empty_title = NewMaterial {
            title: "  ".into(),
            content: "text".into(),
            ..Default::default()
        };
        assert!(matches!(empty_title.into_material(), Err(ReadLevelError::Validation(_))));

        let bad_difficulty = NewMaterial {
            title: "Rain".into(),
            content: "It rains.".into(),
            difficulty: Some(9),
            ..Default::default()
        };
        assert!(matches!(bad_difficulty.into_material(), Err(ReadLevelError::Validation(_))));
    }

    #[test]
    fn test_new_material_defaults() {
        let material = NewMaterial {
            title: " At the Zoo ".into(),
            content: "We saw a lion.".into(),
            tags: vec!["animals".into(), " ".into()],
            audio_url: Some("https://cdn.example.com/zoo.mp3".into()),
            ..Default::default()
        }
        .into_material()
        .unwrap();

        assert_eq!(material.title, "At the Zoo");
        assert_eq!(material.tags, vec!["animals".to_string()]);
        assert_eq!(material.audio_source, Some(AudioSource::External));
        assert_eq!(material.review_status, ReviewStatus::Pending);
    }

    #[test]
    fn test_audio_source_parse() {
        assert_eq!("TTS".parse::<AudioSource>().unwrap(), AudioSource::Tts);
        assert!("radio".parse::<AudioSource>().is_err());
    }
}
