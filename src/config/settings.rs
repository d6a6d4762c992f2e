//! Configuration settings for Readlevel.

use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub splitting: SplittingSettings,
    pub rewrite: RewriteSettings,
    pub assessment: AssessmentSettings,
    pub batch: BatchSettings,
    pub tts: TtsSettings,
    pub library: LibrarySettings,
    pub store: StoreSettings,
    pub import: ImportSettings,
    pub prompts: PromptSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for storing application data.
    pub data_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.readlevel".to_string(),
            log_level: "warn".to_string(),
        }
    }
}

/// Chapter splitting settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SplittingSettings {
    /// Default strategy (paragraph, sentence, semantic, mixed).
    pub strategy: String,
    /// Default word cap per chapter.
    pub max_words_per_chapter: usize,
    /// Enable the LLM topic segmenter for semantic/mixed strategies.
    pub semantic_enabled: bool,
    /// Model used for topic segmentation.
    pub segmentation_model: String,
}

impl Default for SplittingSettings {
    fn default() -> Self {
        Self {
            strategy: "paragraph".to_string(),
            max_words_per_chapter: 1000,
            semantic_enabled: true,
            segmentation_model: "gpt-4o-mini".to_string(),
        }
    }
}

/// Rewrite service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteSettings {
    /// Chat model used to rewrite chapters.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
}

impl Default for RewriteSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            temperature: 0.4,
        }
    }
}

/// Lexile assessment backend.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum AssessmentProvider {
    /// LLM-backed assessment (default).
    #[default]
    OpenAI,
    /// Local syllable-density estimate, no network.
    Heuristic,
}

impl std::str::FromStr for AssessmentProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(AssessmentProvider::OpenAI),
            "heuristic" | "local" => Ok(AssessmentProvider::Heuristic),
            _ => Err(format!("Unknown assessment provider: {}", s)),
        }
    }
}

impl std::fmt::Display for AssessmentProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssessmentProvider::OpenAI => write!(f, "openai"),
            AssessmentProvider::Heuristic => write!(f, "heuristic"),
        }
    }
}

/// Lexile assessment settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssessmentSettings {
    pub provider: AssessmentProvider,
    /// Chat model for the openai provider.
    pub model: String,
}

impl Default for AssessmentSettings {
    fn default() -> Self {
        Self {
            provider: AssessmentProvider::OpenAI,
            model: "gpt-4o-mini".to_string(),
        }
    }
}

/// Batch orchestration and retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    /// Worker pool size per job.
    pub concurrency_limit: usize,
    /// Attempts per external call, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_backoff_ms: u64,
    /// Backoff growth factor.
    pub backoff_multiplier: u32,
    /// How long a finished job stays queryable.
    pub job_retention_secs: u64,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            concurrency_limit: 3,
            max_attempts: 3,
            initial_backoff_ms: 200,
            backoff_multiplier: 3,
            job_retention_secs: 3600,
        }
    }
}

impl BatchSettings {
    /// Retry policy for external collaborators.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.initial_backoff_ms),
            self.backoff_multiplier,
        )
    }

    pub fn job_retention(&self) -> Duration {
        Duration::from_secs(self.job_retention_secs)
    }
}

/// Text-to-speech service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsSettings {
    /// Synthesis endpoint (POST).
    pub endpoint: Option<String>,
    /// Bearer token for the endpoint.
    pub api_key: Option<String>,
    pub default_voice: String,
    pub default_speed: f32,
    pub default_quality: String,
    pub default_language: String,
    pub timeout_secs: u64,
}

impl Default for TtsSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            default_voice: "female".to_string(),
            default_speed: 1.0,
            default_quality: "medium".to_string(),
            default_language: "en".to_string(),
            timeout_secs: 60,
        }
    }
}

/// Audio library lookup settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct LibrarySettings {
    /// Search endpoint (GET).
    pub endpoint: Option<String>,
}

/// Storage backend.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum StoreProvider {
    #[default]
    Sqlite,
    Memory,
}

/// Content store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub provider: StoreProvider,
    /// Path to SQLite database (for sqlite provider).
    pub sqlite_path: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            provider: StoreProvider::Sqlite,
            sqlite_path: "~/.readlevel/content.db".to_string(),
        }
    }
}

/// Table import settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportSettings {
    /// Directory holding exported table records (`<table_id>.json`).
    pub records_dir: String,
    /// Skip records whose title already exists.
    pub skip_existing: bool,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            records_dir: "~/.readlevel/tables".to_string(),
            skip_existing: true,
        }
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct PromptSettings {
    /// Directory for custom prompts (overrides defaults).
    pub custom_dir: Option<String>,
    /// Custom variables available in all prompts as {{variable_name}}.
    pub variables: std::collections::HashMap<String, String>,
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Save settings to the default configuration file.
    pub fn save(&self) -> crate::error::Result<()> {
        self.save_to(&Self::default_config_path())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::ReadLevelError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("readlevel")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Get the expanded SQLite database path.
    pub fn sqlite_path(&self) -> PathBuf {
        Self::expand_path(&self.store.sqlite_path)
    }

    /// Get the expanded table records directory.
    pub fn records_dir(&self) -> PathBuf {
        Self::expand_path(&self.import.records_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            [batch]
            concurrency_limit = 8

            [assessment]
            provider = "heuristic"
            "#,
        )
        .unwrap();

        assert_eq!(settings.batch.concurrency_limit, 8);
        assert_eq!(settings.batch.max_attempts, 3);
        assert_eq!(settings.batch.job_retention(), Duration::from_secs(3600));
        assert_eq!(settings.assessment.provider, AssessmentProvider::Heuristic);
        assert_eq!(settings.splitting.max_words_per_chapter, 1000);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut settings = Settings::default();
        settings.rewrite.model = "gpt-4.1".to_string();
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(Some(&path)).unwrap();
        assert_eq!(loaded.rewrite.model, "gpt-4.1");
        assert_eq!(loaded.store.provider, StoreProvider::Sqlite);
    }

    #[test]
    fn test_retry_policy_from_settings() {
        let policy = BatchSettings::default().retry_policy();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(600));
    }
}
