//! Local Lexile estimate from syllable density.
//!
//! A rough proxy: longer, more polysyllabic vocabulary scores higher. Good
//! enough for tagging drafts when no assessment service is reachable.

use super::LexileAssessor;
use crate::error::{ReadLevelError, Result};
use async_trait::async_trait;

/// Score assigned to text made only of one-syllable words.
const BASE_SCORE: f64 = 250.0;
/// Points per extra syllable in the average word.
const SYLLABLE_WEIGHT: f64 = 1200.0;
/// Points for a text made entirely of words with three or more syllables.
const POLYSYLLABLE_WEIGHT: f64 = 500.0;

/// Syllable-density assessor with no external dependencies.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicAssessor;

impl HeuristicAssessor {
    pub fn new() -> Self {
        Self
    }

    /// Approximate syllables by counting vowel groups.
    fn syllables(word: &str) -> usize {
        let lower: Vec<char> = word
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .map(|c| c.to_ascii_lowercase())
            .collect();

        if lower.is_empty() {
            return 0;
        }

        let is_vowel = |c: char| matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y');
        let mut count = 0;
        let mut prev_vowel = false;
        for &c in &lower {
            let vowel = is_vowel(c);
            if vowel && !prev_vowel {
                count += 1;
            }
            prev_vowel = vowel;
        }

        // Silent trailing 'e' ("make", "stone"), but not "-le" ("little").
        let n = lower.len();
        if count > 1 && lower[n - 1] == 'e' && !(n >= 2 && lower[n - 2] == 'l') {
            count -= 1;
        }

        count.max(1)
    }

    /// Raw score for a word list.
    pub fn score(words: &[String]) -> Option<i32> {
        let counts: Vec<usize> = words
            .iter()
            .map(|w| Self::syllables(w))
            .filter(|&s| s > 0)
            .collect();

        if counts.is_empty() {
            return None;
        }

        let total = counts.len() as f64;
        let avg = counts.iter().sum::<usize>() as f64 / total;
        let polysyllabic = counts.iter().filter(|&&s| s >= 3).count() as f64 / total;

        let score = BASE_SCORE + (avg - 1.0) * SYLLABLE_WEIGHT + polysyllabic * POLYSYLLABLE_WEIGHT;
        Some(score.round() as i32)
    }
}

#[async_trait]
impl LexileAssessor for HeuristicAssessor {
    async fn assess(&self, words: &[String]) -> Result<i32> {
        Self::score(words).ok_or_else(|| {
            ReadLevelError::Validation("No alphabetic words to assess".to_string())
        })
    }
}
