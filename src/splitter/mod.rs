//! Chapter splitting strategies for breaking raw book text into ordered chapters.
//!
//! Paragraph and sentence strategies are local and deterministic. Semantic
//! boundaries come from an optional topic-segmentation collaborator; when it
//! is missing or fails, splitting falls back to paragraphs.

mod semantic;
mod units;

pub use semantic::OpenAISegmenter;
pub use units::count_words;

use crate::error::{ReadLevelError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use units::{accumulate, heading_title, paragraph_units, sentence_units};
use uuid::Uuid;

/// A chapter of a book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: Uuid,
    pub book_id: String,
    /// 1-based position, contiguous within a book.
    pub order: u32,
    /// Text of a leading `# ` heading, else `Chapter {order}`.
    pub title: String,
    pub raw_content: String,
    /// Computed from `raw_content`.
    pub word_count: usize,
}

impl Chapter {
    /// Create a chapter, computing its title and word count.
    pub fn new(book_id: &str, order: u32, raw_content: String) -> Self {
        let title = heading_title(&raw_content)
            .map(str::to_string)
            .unwrap_or_else(|| Self::fallback_title(order));
        Self {
            id: Uuid::new_v4(),
            book_id: book_id.to_string(),
            order,
            title,
            word_count: count_words(&raw_content),
            raw_content,
        }
    }

    pub fn fallback_title(order: u32) -> String {
        format!("Chapter {}", order)
    }
}

/// Splitting strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SplitStrategy {
    /// Accumulate whole paragraphs up to the word cap.
    #[default]
    Paragraph,
    /// Accumulate whole sentences up to the word cap.
    Sentence,
    /// Topic boundaries from the segmentation service.
    Semantic,
    /// Topic boundaries, then the paragraph cap inside each segment.
    Mixed,
}

impl std::str::FromStr for SplitStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "paragraph" => Ok(SplitStrategy::Paragraph),
            "sentence" => Ok(SplitStrategy::Sentence),
            "semantic" => Ok(SplitStrategy::Semantic),
            "mixed" => Ok(SplitStrategy::Mixed),
            _ => Err(format!("Unknown split strategy: {}", s)),
        }
    }
}

impl std::fmt::Display for SplitStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SplitStrategy::Paragraph => write!(f, "paragraph"),
            SplitStrategy::Sentence => write!(f, "sentence"),
            SplitStrategy::Semantic => write!(f, "semantic"),
            SplitStrategy::Mixed => write!(f, "mixed"),
        }
    }
}

/// Topic-segmentation collaborator.
#[async_trait]
pub trait TopicSegmenter: Send + Sync {
    /// Byte offsets into `text` where a new section begins.
    async fn segment(&self, text: &str) -> Result<Vec<usize>>;
}

/// Splits raw text into chapters.
#[derive(Clone, Default)]
pub struct ChapterSplitter {
    segmenter: Option<Arc<dyn TopicSegmenter>>,
}

impl ChapterSplitter {
    /// Splitter without a segmentation service.
    pub fn new() -> Self {
        Self { segmenter: None }
    }

    /// Attach a topic segmenter for the semantic and mixed strategies.
    pub fn with_segmenter(mut self, segmenter: Arc<dyn TopicSegmenter>) -> Self {
        self.segmenter = Some(segmenter);
        self
    }

    /// Split `raw_text` into chapters numbered `1..=N`.
    #[instrument(skip(self, raw_text), fields(len = raw_text.len()))]
    pub async fn split(
        &self,
        book_id: &str,
        raw_text: &str,
        max_words_per_chapter: usize,
        strategy: SplitStrategy,
    ) -> Result<Vec<Chapter>> {
        if raw_text.trim().is_empty() {
            return Err(ReadLevelError::Validation("Cannot split empty text".to_string()));
        }
        if max_words_per_chapter == 0 {
            return Err(ReadLevelError::Validation(
                "max_words_per_chapter must be greater than zero".to_string(),
            ));
        }

        let groups = match strategy {
            SplitStrategy::Paragraph => accumulate(paragraph_units(raw_text), max_words_per_chapter),
            SplitStrategy::Sentence => accumulate(sentence_units(raw_text), max_words_per_chapter),
            SplitStrategy::Semantic => match self.semantic_segments(raw_text).await {
                Some(segments) => segments,
                None => accumulate(paragraph_units(raw_text), max_words_per_chapter),
            },
            SplitStrategy::Mixed => {
                let segments = self
                    .semantic_segments(raw_text)
                    .await
                    .unwrap_or_else(|| vec![raw_text.to_string()]);
                segments
                    .iter()
                    .flat_map(|s| accumulate(paragraph_units(s), max_words_per_chapter))
                    .collect()
            }
        };

        let chapters: Vec<Chapter> = groups
            .into_iter()
            .enumerate()
            .map(|(i, content)| Chapter::new(book_id, i as u32 + 1, content))
            .collect();

        info!("Split book {} into {} chapters ({})", book_id, chapters.len(), strategy);
        Ok(chapters)
    }

    /// Text segments from the segmenter, or `None` when it is unavailable.
    async fn semantic_segments(&self, text: &str) -> Option<Vec<String>> {
        let Some(segmenter) = &self.segmenter else {
            warn!("No topic segmenter configured, falling back to paragraph splitting");
            return None;
        };

        match segmenter.segment(text).await {
            Ok(offsets) => Some(slice_at(text, offsets)),
            Err(e) => {
                warn!("Topic segmentation failed, falling back to paragraph splitting: {}", e);
                None
            }
        }
    }
}

/// Cut `text` at the given byte offsets. Offsets are snapped forward to char
/// boundaries; out-of-range and duplicate offsets are ignored.
fn slice_at(text: &str, offsets: Vec<usize>) -> Vec<String> {
    let mut cuts: Vec<usize> = offsets
        .into_iter()
        .filter(|&o| o > 0 && o < text.len())
        .map(|mut o| {
            while !text.is_char_boundary(o) {
                o += 1;
            }
            o
        })
        .collect();
    cuts.sort_unstable();
    cuts.dedup();

    let mut segments = Vec::with_capacity(cuts.len() + 1);
    let mut start = 0;
    for cut in cuts.into_iter().chain(std::iter::once(text.len())) {
        let segment = text[start..cut].trim();
        if !segment.is_empty() {
            segments.push(segment.to_string());
        }
        start = cut;
    }
    segments
}
