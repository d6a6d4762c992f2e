//! Lexile-like difficulty classification.
//!
//! Maps numeric reading scores onto the fixed bucket scale and estimates
//! scores for word lists through a pluggable assessment collaborator.

mod heuristic;
mod openai;

pub use heuristic::HeuristicAssessor;
pub use openai::OpenAIAssessor;

use crate::error::{ReadLevelError, Result};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Lowest score accepted after clamping.
pub const LEXILE_MIN: i32 = 200;
/// Highest score accepted after clamping.
pub const LEXILE_MAX: i32 = 1700;
/// Minimum number of words `estimate` will assess.
pub const MIN_ESTIMATE_WORDS: usize = 5;

/// Named difficulty bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LexileBucket {
    Beginner,
    Ket,
    Pet,
    Custom,
}

impl LexileBucket {
    pub const ALL: [LexileBucket; 4] = [
        LexileBucket::Beginner,
        LexileBucket::Ket,
        LexileBucket::Pet,
        LexileBucket::Custom,
    ];

    /// Inclusive lower bound of the bucket.
    pub fn lower_bound(self) -> i32 {
        match self {
            LexileBucket::Beginner => 0,
            LexileBucket::Ket => 400,
            LexileBucket::Pet => 700,
            LexileBucket::Custom => 1000,
        }
    }

    /// Exclusive upper bound; `None` for the open-ended last bucket.
    pub fn upper_bound(self) -> Option<i32> {
        match self {
            LexileBucket::Beginner => Some(400),
            LexileBucket::Ket => Some(700),
            LexileBucket::Pet => Some(1000),
            LexileBucket::Custom => None,
        }
    }

    /// Midpoint score used by quick-select. The open bucket is capped at `LEXILE_MAX`.
    pub fn midpoint(self) -> i32 {
        let upper = self.upper_bound().unwrap_or(LEXILE_MAX);
        (self.lower_bound() + upper) / 2
    }

    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            LexileBucket::Beginner => "Beginner",
            LexileBucket::Ket => "Cambridge KET",
            LexileBucket::Pet => "Cambridge PET",
            LexileBucket::Custom => "Custom",
        }
    }

    fn for_score(score: i32) -> Self {
        Self::ALL
            .into_iter()
            .rev()
            .find(|b| score >= b.lower_bound())
            .unwrap_or(LexileBucket::Beginner)
    }
}

impl std::fmt::Display for LexileBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LexileBucket::Beginner => write!(f, "BEGINNER"),
            LexileBucket::Ket => write!(f, "KET"),
            LexileBucket::Pet => write!(f, "PET"),
            LexileBucket::Custom => write!(f, "CUSTOM"),
        }
    }
}

impl std::str::FromStr for LexileBucket {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "beginner" => Ok(LexileBucket::Beginner),
            "ket" => Ok(LexileBucket::Ket),
            "pet" => Ok(LexileBucket::Pet),
            "custom" => Ok(LexileBucket::Custom),
            _ => Err(format!("Unknown Lexile bucket: {}", s)),
        }
    }
}

/// Result of classifying a score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// Score after clamping to `[LEXILE_MIN, LEXILE_MAX]`.
    pub score: i32,
    pub bucket: LexileBucket,
    pub label: String,
}

/// Clamp a score into the accepted range.
pub fn clamp_score(score: i32) -> i32 {
    score.clamp(LEXILE_MIN, LEXILE_MAX)
}

/// Classify a score into its bucket. Negative scores are rejected.
pub fn classify(score: i32) -> Result<Classification> {
    if score < 0 {
        return Err(ReadLevelError::Validation(format!(
            "Lexile score must be non-negative, got {}",
            score
        )));
    }

    let score = clamp_score(score);
    let bucket = LexileBucket::for_score(score);

    Ok(Classification {
        score,
        bucket,
        label: bucket.label().to_string(),
    })
}

/// Midpoint score for a bucket, bypassing estimation.
pub fn quick_select(bucket: LexileBucket) -> i32 {
    bucket.midpoint()
}

/// Suggested reading range around a score.
pub fn recommended_range(score: i32) -> (i32, i32) {
    ((score - 100).max(LEXILE_MIN), (score + 100).min(LEXILE_MAX))
}

/// Tokenize text into assessable words: alphabetic runs with apostrophes.
pub fn words_of(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
                .to_string()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

/// External assessment collaborator.
#[async_trait]
pub trait LexileAssessor: Send + Sync {
    /// Assess a word list and return a raw score.
    async fn assess(&self, words: &[String]) -> Result<i32>;

    /// Fails with `ServiceUnavailable` when the assessor cannot be used.
    async fn check(&self) -> Result<()> {
        Ok(())
    }
}

/// Classifies scores and estimates them through an assessor.
#[derive(Clone)]
pub struct LexileClassifier {
    assessor: Arc<dyn LexileAssessor>,
    retry: RetryPolicy,
}

impl LexileClassifier {
    pub fn new(assessor: Arc<dyn LexileAssessor>, retry: RetryPolicy) -> Self {
        Self { assessor, retry }
    }

    pub fn classify(&self, score: i32) -> Result<Classification> {
        classify(score)
    }

    pub fn quick_select(&self, bucket: LexileBucket) -> i32 {
        quick_select(bucket)
    }

    pub async fn check(&self) -> Result<()> {
        self.assessor.check().await
    }

    /// Estimate a clamped score for a word list (at least `MIN_ESTIMATE_WORDS`).
    #[instrument(skip(self, words), fields(count = words.len()))]
    pub async fn estimate(&self, words: &[String]) -> Result<i32> {
        if words.len() < MIN_ESTIMATE_WORDS {
            return Err(ReadLevelError::Validation(format!(
                "Lexile estimation needs at least {} words, got {}",
                MIN_ESTIMATE_WORDS,
                words.len()
            )));
        }

        let raw = self
            .retry
            .run("lexile assessment", || self.assessor.assess(words))
            .await?;
        let score = clamp_score(raw);
        debug!("Estimated Lexile {} (raw {})", score, raw);
        Ok(score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedAssessor(i32);

    #[async_trait]
    impl LexileAssessor for FixedAssessor {
        async fn assess(&self, _words: &[String]) -> Result<i32> {
            Ok(self.0)
        }
    }

    fn words(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("word{}", i)).collect()
    }

    #[test]
    fn test_classify_buckets() {
        assert_eq!(classify(650).unwrap().bucket, LexileBucket::Ket);
        assert_eq!(classify(150).unwrap().bucket, LexileBucket::Beginner);
        assert_eq!(classify(400).unwrap().bucket, LexileBucket::Ket);
        assert_eq!(classify(999).unwrap().bucket, LexileBucket::Pet);
        assert_eq!(classify(1000).unwrap().bucket, LexileBucket::Custom);
    }

    #[test]
    fn test_classify_clamps() {
        let high = classify(1800).unwrap();
        assert_eq!(high.score, 1700);
        assert_eq!(high.bucket, LexileBucket::Custom);

        let low = classify(150).unwrap();
        assert_eq!(low.score, 200);
        assert_eq!(low.label, "Beginner");
    }

    #[test]
    fn test_classify_rejects_negative() {
        assert!(matches!(classify(-5), Err(ReadLevelError::Validation(_))));
    }

    #[test]
    fn test_quick_select_midpoints() {
        assert_eq!(quick_select(LexileBucket::Beginner), 200);
        assert_eq!(quick_select(LexileBucket::Ket), 550);
        assert_eq!(quick_select(LexileBucket::Pet), 850);
        assert_eq!(quick_select(LexileBucket::Custom), 1350);
        for bucket in LexileBucket::ALL {
            assert_eq!(classify(quick_select(bucket)).unwrap().bucket, bucket);
        }
    }

    #[test]
    fn test_recommended_range() {
        assert_eq!(recommended_range(250), (200, 350));
        assert_eq!(recommended_range(1650), (1550, 1700));
    }

    #[test]
    fn test_words_of_strips_punctuation() {
        assert_eq!(
            words_of("\"Don't run,\" she said -- quickly!"),
            vec!["Don't", "run", "she", "said", "quickly"]
        );
    }

    #[tokio::test]
    async fn test_estimate_requires_five_words() {
        let classifier = LexileClassifier::new(Arc::new(FixedAssessor(600)), RetryPolicy::none());
        let err = classifier.estimate(&words(4)).await.unwrap_err();
        assert!(matches!(err, ReadLevelError::Validation(_)));
    }

    #[tokio::test]
    async fn test_estimate_clamps_assessor_output() {
        let classifier = LexileClassifier::new(Arc::new(FixedAssessor(2400)), RetryPolicy::none());
        assert_eq!(classifier.estimate(&words(5)).await.unwrap(), LEXILE_MAX);
    }
}
