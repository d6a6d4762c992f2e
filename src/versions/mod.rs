//! Difficulty-adapted chapter versions.
//!
//! A version is a rewrite of a chapter for one difficulty level, tagged with
//! a Lexile level that is either the requested target or an estimate of the
//! rewritten text.

mod openai;
mod quality;

pub use openai::OpenAIRewriter;
pub use quality::{QualityIssue, QualityReport, QUALITY_PASS_SCORE};

use crate::error::{ReadLevelError, Result};
use crate::lexile::{classify, words_of, LexileBucket, LexileClassifier, LEXILE_MAX, LEXILE_MIN, MIN_ESTIMATE_WORDS};
use crate::retry::RetryPolicy;
use crate::splitter::count_words;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Lowest authoring difficulty.
pub const DIFFICULTY_MIN: u8 = 1;
/// Highest authoring difficulty.
pub const DIFFICULTY_MAX: u8 = 5;

/// Publication state of a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionStatus {
    Draft,
    Published,
    /// Superseded by a newer published version of the same difficulty.
    Archived,
}

impl std::fmt::Display for VersionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VersionStatus::Draft => write!(f, "draft"),
            VersionStatus::Published => write!(f, "published"),
            VersionStatus::Archived => write!(f, "archived"),
        }
    }
}

impl std::str::FromStr for VersionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "draft" => Ok(VersionStatus::Draft),
            "published" => Ok(VersionStatus::Published),
            "archived" => Ok(VersionStatus::Archived),
            _ => Err(format!("Unknown version status: {}", s)),
        }
    }
}

/// Where a version's Lexile level came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LexileSource {
    /// The caller's requested target.
    Target,
    /// Estimated from the rewritten text.
    Computed,
}

impl std::fmt::Display for LexileSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LexileSource::Target => write!(f, "target"),
            LexileSource::Computed => write!(f, "computed"),
        }
    }
}

impl std::str::FromStr for LexileSource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "target" => Ok(LexileSource::Target),
            "computed" => Ok(LexileSource::Computed),
            _ => Err(format!("Unknown lexile source: {}", s)),
        }
    }
}

/// A stored, difficulty-specific rendition of a chapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterVersion {
    pub id: Uuid,
    pub chapter_id: Uuid,
    /// Free-form label, unique per chapter (e.g. "1.1.0").
    pub version_label: String,
    pub difficulty: u8,
    pub lexile_level: Option<i32>,
    pub lexile_source: LexileSource,
    pub content: String,
    pub word_count: usize,
    pub status: VersionStatus,
    /// `None` for versions stored before quality checks existed.
    pub quality: Option<QualityReport>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// Output of a single generation, before it is attached to a chapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedVersion {
    pub content: String,
    pub word_count: usize,
    pub lexile_level: Option<i32>,
    pub lexile_source: LexileSource,
    pub status: VersionStatus,
    pub quality: QualityReport,
}

impl GeneratedVersion {
    /// Attach the generated text to a chapter as a draft version.
    pub fn into_version(
        self,
        chapter_id: Uuid,
        version_label: &str,
        difficulty: u8,
        created_by: &str,
    ) -> ChapterVersion {
        ChapterVersion {
            id: Uuid::new_v4(),
            chapter_id,
            version_label: version_label.to_string(),
            difficulty,
            lexile_level: self.lexile_level,
            lexile_source: self.lexile_source,
            content: self.content,
            word_count: self.word_count,
            status: self.status,
            quality: Some(self.quality),
            created_by: created_by.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Rewrite collaborator.
#[async_trait]
pub trait Rewriter: Send + Sync {
    /// Rewrite `text` for the given difficulty and optional Lexile target.
    async fn rewrite(&self, text: &str, difficulty: u8, target_lexile: Option<i32>) -> Result<String>;

    /// Fails with `ServiceUnavailable` when the rewriter cannot be used.
    async fn check(&self) -> Result<()> {
        Ok(())
    }
}

/// Check a difficulty is in `1..=5`.
pub fn validate_difficulty(difficulty: u8) -> Result<()> {
    if !(DIFFICULTY_MIN..=DIFFICULTY_MAX).contains(&difficulty) {
        return Err(ReadLevelError::Validation(format!(
            "Difficulty must be between {} and {}, got {}",
            DIFFICULTY_MIN, DIFFICULTY_MAX, difficulty
        )));
    }
    Ok(())
}

/// Check a target Lexile is within the accepted range.
pub fn validate_target_lexile(target: Option<i32>) -> Result<()> {
    match target {
        Some(t) if !(LEXILE_MIN..=LEXILE_MAX).contains(&t) => Err(ReadLevelError::Validation(format!(
            "Target Lexile must be between {} and {}, got {}",
            LEXILE_MIN, LEXILE_MAX, t
        ))),
        _ => Ok(()),
    }
}

/// Produces one adapted version of a chapter.
#[derive(Clone)]
pub struct VersionGenerator {
    rewriter: Arc<dyn Rewriter>,
    classifier: LexileClassifier,
    retry: RetryPolicy,
}

impl VersionGenerator {
    pub fn new(rewriter: Arc<dyn Rewriter>, classifier: LexileClassifier, retry: RetryPolicy) -> Self {
        Self {
            rewriter,
            classifier,
            retry,
        }
    }

    pub fn classifier(&self) -> &LexileClassifier {
        &self.classifier
    }

    /// Check collaborators before a batch; `estimates` when some items have no target.
    pub async fn preflight(&self, estimates: bool) -> Result<()> {
        self.rewriter.check().await?;
        if estimates {
            self.classifier.check().await?;
        }
        Ok(())
    }

    /// Rewrite `chapter_content` for `difficulty` and tag the result with a Lexile level.
    #[instrument(skip(self, chapter_content), fields(len = chapter_content.len()))]
    pub async fn generate(
        &self,
        chapter_content: &str,
        difficulty: u8,
        target_lexile: Option<i32>,
    ) -> Result<GeneratedVersion> {
        if chapter_content.trim().is_empty() {
            return Err(ReadLevelError::Validation("Chapter content is empty".to_string()));
        }
        validate_difficulty(difficulty)?;
        validate_target_lexile(target_lexile)?;

        let content = self
            .retry
            .run("rewrite", || {
                self.rewriter.rewrite(chapter_content, difficulty, target_lexile)
            })
            .await?;

        let content = content.trim().to_string();
        if content.is_empty() {
            return Err(ReadLevelError::ExternalService(
                "Rewrite service returned empty content".to_string(),
            ));
        }
        let word_count = count_words(&content);

        let (lexile_level, lexile_source) = match target_lexile {
            Some(target) => (Some(target), LexileSource::Target),
            None => {
                let words = words_of(&content);
                if words.len() < MIN_ESTIMATE_WORDS {
                    warn!("Rewritten text too short to estimate ({} words)", words.len());
                    (None, LexileSource::Computed)
                } else {
                    (Some(self.classifier.estimate(&words).await?), LexileSource::Computed)
                }
            }
        };

        let quality = QualityReport::check(&content);
        if !quality.passed {
            warn!("Version failed quality check (score {}): {:?}", quality.score, quality.issues);
        }

        info!(
            "Generated difficulty {} version: {} words, Lexile {:?} ({}), quality {}",
            difficulty, word_count, lexile_level, lexile_source, quality.score
        );

        Ok(GeneratedVersion {
            content,
            word_count,
            lexile_level,
            lexile_source,
            status: VersionStatus::Draft,
            quality,
        })
    }
}

/// Side-by-side summary of two versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionComparison {
    pub left_id: Uuid,
    pub right_id: Uuid,
    pub same_chapter: bool,
    /// `right - left`.
    pub word_count_delta: i64,
    pub difficulty_delta: i16,
    /// `right - left`, when both sides have a level.
    pub lexile_delta: Option<i32>,
    pub left_bucket: Option<LexileBucket>,
    pub right_bucket: Option<LexileBucket>,
}

/// Compare two versions.
pub fn compare(left: &ChapterVersion, right: &ChapterVersion) -> VersionComparison {
    let bucket = |v: &ChapterVersion| {
        v.lexile_level
            .and_then(|l| classify(l).ok())
            .map(|c| c.bucket)
    };

    VersionComparison {
        left_id: left.id,
        right_id: right.id,
        same_chapter: left.chapter_id == right.chapter_id,
        word_count_delta: right.word_count as i64 - left.word_count as i64,
        difficulty_delta: right.difficulty as i16 - left.difficulty as i16,
        lexile_delta: left.lexile_level.zip(right.lexile_level).map(|(l, r)| r - l),
        left_bucket: bucket(left),
        right_bucket: bucket(right),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexile::LexileAssessor;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct EchoRewriter;

    #[async_trait]
    impl Rewriter for EchoRewriter {
        async fn rewrite(&self, text: &str, difficulty: u8, _target: Option<i32>) -> Result<String> {
            Ok(format!("  level {} {}  ", difficulty, text))
        }
    }

    struct FlakyRewriter {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Rewriter for FlakyRewriter {
        async fn rewrite(&self, text: &str, _difficulty: u8, _target: Option<i32>) -> Result<String> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                Err(ReadLevelError::ExternalService("503 from rewrite".into()))
            } else {
                Ok(text.to_string())
            }
        }
    }

    struct FixedAssessor(i32);

    #[async_trait]
    impl LexileAssessor for FixedAssessor {
        async fn assess(&self, _words: &[String]) -> Result<i32> {
            Ok(self.0)
        }
    }

    fn retry() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1), 3)
    }

    fn generator(rewriter: Arc<dyn Rewriter>) -> VersionGenerator {
        let classifier = LexileClassifier::new(Arc::new(FixedAssessor(620)), retry());
        VersionGenerator::new(rewriter, classifier, retry())
    }

    #[tokio::test]
    async fn test_generate_with_target() {
        let version = generator(Arc::new(EchoRewriter))
            .generate("The fox ran away.", 2, Some(450))
            .await
            .unwrap();

        assert_eq!(version.content, "level 2 The fox ran away.");
        assert_eq!(version.word_count, 6);
        assert_eq!(version.lexile_level, Some(450));
        assert_eq!(version.lexile_source, LexileSource::Target);
        assert_eq!(version.status, VersionStatus::Draft);
        assert_eq!(version.quality.issues, vec![QualityIssue::TooShort, QualityIssue::TooLittleEnglish]);
        assert!(!version.quality.passed);
    }

    #[tokio::test]
    async fn test_generate_reports_quality() {
        let text = "Mia found a small brown dog by the old gate. She gave it water and bread. \
                    The dog wagged its tail and followed her all the way home.";
        let version = generator(Arc::new(EchoRewriter)).generate(text, 1, Some(300)).await.unwrap();
        assert!(version.quality.passed);
        assert_eq!(version.quality.score, 100);

        let stored = version.into_version(Uuid::new_v4(), "1.0.0", 1, "editor");
        assert_eq!(stored.quality.map(|q| q.score), Some(100));
    }

    #[tokio::test]
    async fn test_generate_computes_lexile() {
        let version = generator(Arc::new(EchoRewriter))
            .generate("The fox ran far away.", 3, None)
            .await
            .unwrap();

        assert_eq!(version.lexile_level, Some(620));
        assert_eq!(version.lexile_source, LexileSource::Computed);
    }

    #[tokio::test]
    async fn test_generate_validates_before_calling_service() {
        let rewriter = Arc::new(FlakyRewriter {
            failures: 0,
            calls: AtomicU32::new(0),
        });
        let gen = generator(rewriter.clone());

        assert!(matches!(gen.generate("text", 0, None).await, Err(ReadLevelError::Validation(_))));
        assert!(matches!(gen.generate("text", 6, None).await, Err(ReadLevelError::Validation(_))));
        assert!(matches!(gen.generate("   ", 3, None).await, Err(ReadLevelError::Validation(_))));
        assert!(matches!(
            gen.generate("text", 3, Some(5000)).await,
            Err(ReadLevelError::Validation(_))
        ));
        assert_eq!(rewriter.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_generate_retries_transient_failures() {
        let rewriter = Arc::new(FlakyRewriter {
            failures: 2,
            calls: AtomicU32::new(0),
        });
        let version = generator(rewriter.clone())
            .generate("A short tale of one small cat.", 1, None)
            .await
            .unwrap();

        assert_eq!(rewriter.calls.load(Ordering::SeqCst), 3);
        assert_eq!(version.word_count, 7);
    }

    #[tokio::test]
    async fn test_generate_gives_up_after_three_attempts() {
        let rewriter = Arc::new(FlakyRewriter {
            failures: 10,
            calls: AtomicU32::new(0),
        });
        let result = generator(rewriter.clone()).generate("Some text here.", 1, None).await;

        assert!(matches!(result, Err(ReadLevelError::ExternalService(_))));
        assert_eq!(rewriter.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_short_rewrite_has_no_lexile() {
        let version = generator(Arc::new(EchoRewriter)).generate("Hi.", 1, None).await.unwrap();
        assert_eq!(version.lexile_level, None);
        assert_eq!(version.lexile_source, LexileSource::Computed);
    }

    #[test]
    fn test_compare_versions() {
        let chapter = Uuid::new_v4();
        let base = GeneratedVersion {
            content: "x".repeat(10),
            word_count: 900,
            lexile_level: Some(950),
            lexile_source: LexileSource::Computed,
            status: VersionStatus::Draft,
            quality: QualityReport::check("x"),
        };
        let left = base.clone().into_version(chapter, "1.0.0", 4, "editor");
        let right = GeneratedVersion {
            word_count: 600,
            lexile_level: Some(480),
            ..base
        }
        .into_version(chapter, "1.1.0", 2, "editor");

        let cmp = compare(&left, &right);
        assert!(cmp.same_chapter);
        assert_eq!(cmp.word_count_delta, -300);
        assert_eq!(cmp.difficulty_delta, -2);
        assert_eq!(cmp.lexile_delta, Some(-470));
        assert_eq!(cmp.left_bucket, Some(LexileBucket::Pet));
        assert_eq!(cmp.right_bucket, Some(LexileBucket::Ket));
    }
}
