//! Content quality check for generated versions.
//!
//! The score starts at 100 and each issue found subtracts a fixed penalty.
//! A version passes at [`QUALITY_PASS_SCORE`] or above. Failing versions are
//! still stored as drafts; the report tells an editor what to look at.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Lowest passing score.
pub const QUALITY_PASS_SCORE: u8 = 60;
/// Content shorter than this many characters is too short.
pub const MIN_CONTENT_CHARS: usize = 100;
/// Content with fewer English words than this has too little English.
pub const MIN_ENGLISH_WORDS: usize = 10;

static ENGLISH_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b[a-zA-Z]+\b").expect("Invalid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QualityIssue {
    Empty,
    TooShort,
    TooLittleEnglish,
    ExtraSpaces,
    ExtraBlankLines,
}

impl QualityIssue {
    pub fn penalty(self) -> u8 {
        match self {
            QualityIssue::Empty => 50,
            QualityIssue::TooShort => 20,
            QualityIssue::TooLittleEnglish => 30,
            QualityIssue::ExtraSpaces | QualityIssue::ExtraBlankLines => 5,
        }
    }
}

impl std::fmt::Display for QualityIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QualityIssue::Empty => write!(f, "content is empty"),
            QualityIssue::TooShort => write!(f, "content is shorter than {} characters", MIN_CONTENT_CHARS),
            QualityIssue::TooLittleEnglish => write!(f, "fewer than {} English words", MIN_ENGLISH_WORDS),
            QualityIssue::ExtraSpaces => write!(f, "repeated spaces"),
            QualityIssue::ExtraBlankLines => write!(f, "repeated blank lines"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityReport {
    /// 0-100.
    pub score: u8,
    pub passed: bool,
    pub issues: Vec<QualityIssue>,
}

impl QualityReport {
    /// Score `content`.
    pub fn check(content: &str) -> Self {
        let mut issues = Vec::new();
        if content.trim().is_empty() {
            issues.push(QualityIssue::Empty);
        }
        if content.chars().count() < MIN_CONTENT_CHARS {
            issues.push(QualityIssue::TooShort);
        }
        if ENGLISH_WORD.find_iter(content).count() < MIN_ENGLISH_WORDS {
            issues.push(QualityIssue::TooLittleEnglish);
        }
        if content.contains("  ") {
            issues.push(QualityIssue::ExtraSpaces);
        }
        if content.contains("\n\n\n") {
            issues.push(QualityIssue::ExtraBlankLines);
        }

        let score = issues.iter().fold(100u8, |score, issue| score.saturating_sub(issue.penalty()));
        Self {
            score,
            passed: score >= QUALITY_PASS_SCORE,
            issues,
        }
    }
}
