//! Text units and word-capped accumulation.
//!
//! Paragraph and sentence strategies both reduce to: cut the text into
//! indivisible units, then greedily pack units into chapters without
//! crossing the word cap.

use regex::Regex;
use std::sync::LazyLock;

/// Blank line (possibly containing spaces) between paragraphs.
static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t\r]*\n\s*").expect("Invalid regex"));

/// Markdown level-one heading at the start of a line.
static HEADING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^[ \t]*# ").expect("Invalid regex"));

/// Sentence terminator plus any closing quotes/brackets and trailing whitespace.
static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[.!?]+["'”’)\]]*\s+"#).expect("Invalid regex"));

/// An indivisible piece of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Unit {
    pub text: String,
    pub words: usize,
    /// Unit opens a new paragraph (joined with a blank line, not a space).
    pub paragraph_start: bool,
    /// Unit is a heading line; a chapter always starts here.
    pub chapter_start: bool,
}

impl Unit {
    fn new(text: &str, paragraph_start: bool) -> Self {
        Self {
            text: text.to_string(),
            words: count_words(text),
            paragraph_start,
            chapter_start: false,
        }
    }

    fn heading(text: &str) -> Self {
        Self {
            chapter_start: true,
            ..Self::new(text, true)
        }
    }
}

/// Whitespace-delimited token count.
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Title of a leading `# ` heading line.
pub(crate) fn heading_title(text: &str) -> Option<&str> {
    let first = text.trim_start().lines().next()?.trim();
    first.strip_prefix("# ").map(str::trim).filter(|t| !t.is_empty())
}

/// Cut text before every heading line. Only the first section may lack a heading.
fn sections(text: &str) -> Vec<&str> {
    let mut cuts: Vec<usize> = HEADING.find_iter(text).map(|m| m.start()).collect();
    cuts.push(text.len());

    let mut out = Vec::with_capacity(cuts.len());
    let mut start = 0;
    for cut in cuts {
        if cut > start && !text[start..cut].trim().is_empty() {
            out.push(&text[start..cut]);
        }
        start = cut;
    }
    out
}

/// Split a section into its heading line, if any, and the body after it.
fn split_heading(section: &str) -> (Option<&str>, &str) {
    let trimmed = section.trim_start();
    if !trimmed.starts_with("# ") {
        return (None, section);
    }
    match trimmed.split_once('\n') {
        Some((heading, body)) => (Some(heading.trim()), body),
        None => (Some(trimmed.trim()), ""),
    }
}

/// Split text into trimmed, non-empty paragraphs.
pub(crate) fn paragraphs(text: &str) -> Vec<&str> {
    PARAGRAPH_BREAK
        .split(text)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

/// Split a paragraph into sentences; a trailing fragment without a terminator is kept.
pub(crate) fn sentences(paragraph: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;

    for m in SENTENCE_END.find_iter(paragraph) {
        let sentence = paragraph[start..m.end()].trim();
        if !sentence.is_empty() {
            out.push(sentence);
        }
        start = m.end();
    }

    let tail = paragraph[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }

    out
}

/// Whole paragraphs. A paragraph opening with a heading starts a chapter.
pub(crate) fn paragraph_units(text: &str) -> Vec<Unit> {
    sections(text)
        .into_iter()
        .flat_map(|section| {
            let headed = split_heading(section).0.is_some();
            paragraphs(section)
                .into_iter()
                .enumerate()
                .map(move |(i, p)| Unit {
                    chapter_start: headed && i == 0,
                    ..Unit::new(p, true)
                })
        })
        .collect()
}

/// Sentences, with each heading line as a unit of its own.
pub(crate) fn sentence_units(text: &str) -> Vec<Unit> {
    let mut units = Vec::new();
    for section in sections(text) {
        let (heading, body) = split_heading(section);
        if let Some(heading) = heading {
            units.push(Unit::heading(heading));
        }
        for p in paragraphs(body) {
            units.extend(sentences(p).into_iter().enumerate().map(|(i, s)| Unit::new(s, i == 0)));
        }
    }
    units
}

/// Greedily pack units into groups of at most `max_words` words.
///
/// A unit larger than the cap forms a group of its own. A heading unit
/// always opens a new group.
pub(crate) fn accumulate(units: Vec<Unit>, max_words: usize) -> Vec<String> {
    let mut groups = Vec::new();
    let mut current = String::new();
    let mut current_words = 0;

    for unit in units {
        let full = current_words > 0 && current_words + unit.words > max_words;
        if !current.is_empty() && (full || unit.chapter_start) {
            groups.push(std::mem::take(&mut current));
            current_words = 0;
        }

        if !current.is_empty() {
            current.push_str(if unit.paragraph_start { "\n\n" } else { " " });
        }
        current.push_str(&unit.text);
        current_words += unit.words;
    }

    if !current.is_empty() {
        groups.push(current);
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paragraphs_handle_blank_lines_with_spaces() {
        let text = "First para\nstill first.\n   \n\nSecond para.\n\n\n  Third.  ";
        assert_eq!(
            paragraphs(text),
            vec!["First para\nstill first.", "Second para.", "Third."]
        );
    }

    #[test]
    fn test_sentences() {
        let para = "Tom ran. \"Wait!\" she cried. Why? Because it was late";
        assert_eq!(
            sentences(para),
            vec!["Tom ran.", "\"Wait!\"", "she cried.", "Why?", "Because it was late"]
        );
    }

    #[test]
    fn test_accumulate_respects_cap() {
        let units = vec![
            Unit::new("a b c", true),
            Unit::new("d e", true),
            Unit::new("f g h i", true),
        ];
        let groups = accumulate(units, 5);
        assert_eq!(groups, vec!["a b c\n\nd e", "f g h i"]);
    }

    #[test]
    fn test_accumulate_oversized_unit_stands_alone() {
        let units = vec![
            Unit::new("a", true),
            Unit::new("b c d e f g", true),
            Unit::new("h", true),
        ];
        let groups = accumulate(units, 3);
        assert_eq!(groups, vec!["a", "b c d e f g", "h"]);
    }

    #[test]
    fn test_heading_title() {
        assert_eq!(heading_title("# The Storm\nRain fell."), Some("The Storm"));
        assert_eq!(heading_title("\n  #  Spaced  \nText"), Some("Spaced"));
        assert_eq!(heading_title("  # Indented\nText"), Some("Indented"));
        assert_eq!(heading_title("## Second level\nText"), None);
        assert_eq!(heading_title("#\nText"), None);
        assert_eq!(heading_title("Plain text."), None);
    }

    #[test]
    fn test_sections_cut_before_headings() {
        let text = "Preface line.\n# One\nFirst body.\n\n# Two\nSecond body.";
        assert_eq!(
            sections(text),
            vec!["Preface line.\n", "# One\nFirst body.\n\n", "# Two\nSecond body."]
        );
        assert_eq!(sections("No headings here."), vec!["No headings here."]);
    }

    #[test]
    fn test_headings_force_new_groups() {
        let text = "# One\nA b c.\n\n# Two\nD e.\n\nF g.";
        let groups = accumulate(paragraph_units(text), 100);
        assert_eq!(groups, vec!["# One\nA b c.", "# Two\nD e.\n\nF g."]);

        let groups = accumulate(sentence_units(text), 100);
        assert_eq!(groups, vec!["# One\n\nA b c.", "# Two\n\nD e.\n\nF g."]);
    }

    #[test]
    fn test_sentence_units_keep_paragraph_breaks() {
        let units = sentence_units("One. Two.\n\nThree.");
        let groups = accumulate(units, 100);
        assert_eq!(groups, vec!["One. Two.\n\nThree."]);
    }
}
