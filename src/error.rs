//! Error types for Readlevel.

use thiserror::Error;

/// Library-level error type for Readlevel operations.
#[derive(Error, Debug)]
pub enum ReadLevelError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Task panicked: {0}")]
    Panicked(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("OpenAI API error: {0}")]
    OpenAI(String),
}

impl ReadLevelError {
    /// Whether a retry of the same call might succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ReadLevelError::ExternalService(_) | ReadLevelError::OpenAI(_) | ReadLevelError::Http(_)
        )
    }
}

/// Result type alias for Readlevel operations.
pub type Result<T> = std::result::Result<T, ReadLevelError>;
