//! CLI output formatting utilities.

use crate::batch::BatchOutcome;
use crate::material::ListeningMaterial;
use crate::splitter::Chapter;
use crate::versions::ChapterVersion;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Output helper for CLI formatting.
pub struct Output;

impl Output {
    /// Print an info message.
    pub fn info(msg: &str) {
        println!("{} {}", style(">>").cyan().bold(), msg);
    }

    /// Print a success message.
    pub fn success(msg: &str) {
        println!("{} {}", style(">>").green().bold(), msg);
    }

    /// Print a warning message.
    pub fn warning(msg: &str) {
        eprintln!("{} {}", style(">>").yellow().bold(), msg);
    }

    /// Print an error message.
    pub fn error(msg: &str) {
        eprintln!("{} {}", style(">>").red().bold(), msg);
    }

    /// Print a header.
    pub fn header(msg: &str) {
        println!("\n{}", style(msg).bold().underlined());
    }

    /// Print a key-value pair.
    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", style(key).dim(), value);
    }

    /// Print a list item.
    pub fn list_item(msg: &str) {
        println!("  {} {}", style("*").cyan(), msg);
    }

    pub fn chapter(chapter: &Chapter) {
        println!(
            "  {} {} {} ({}, {} words)",
            style(format!("#{}", chapter.order)).cyan(),
            style(&chapter.title).bold(),
            content_preview(&chapter.raw_content, 60),
            style(chapter.id).dim(),
            chapter.word_count
        );
    }

    pub fn version(version: &ChapterVersion) {
        let lexile = version
            .lexile_level
            .map(|l| format!("{}L {}", l, version.lexile_source))
            .unwrap_or_else(|| "no Lexile".to_string());
        println!(
            "  {} {} [{}] difficulty {}, {} words, {} ({})",
            style("*").cyan(),
            style(&version.version_label).bold(),
            version.status,
            version.difficulty,
            version.word_count,
            lexile,
            style(version.id).dim()
        );
        if let Some(quality) = version.quality.as_ref().filter(|q| !q.issues.is_empty()) {
            let issues: Vec<String> = quality.issues.iter().map(|i| i.to_string()).collect();
            let line = format!("quality {}: {}", quality.score, issues.join("; "));
            if quality.passed {
                println!("    {}", style(line).dim());
            } else {
                Output::warning(&line);
            }
        }
    }

    pub fn material(material: &ListeningMaterial) {
        let audio = match (&material.audio_source, material.match_confidence) {
            (Some(source), Some(c)) => format!("{} audio, {:.0}%", source, c * 100.0),
            (Some(source), None) => format!("{} audio", source),
            (None, _) => "no audio".to_string(),
        };
        println!(
            "  {} {} [{}] {} ({})",
            style("*").cyan(),
            style(&material.title).bold(),
            material.review_status,
            audio,
            style(material.id).dim()
        );
    }

    /// Print item counts, then each failure with its reason.
    pub fn outcome(outcome: &BatchOutcome) {
        Output::kv("Succeeded", &outcome.succeeded.len().to_string());
        Output::kv("Failed", &outcome.failed.len().to_string());
        Output::kv("Skipped", &outcome.skipped.len().to_string());
        for failure in &outcome.failed {
            Output::warning(&format!("{}: {}", failure.target_id, failure.error));
        }
    }

    /// Create a percentage progress bar.
    pub fn progress_bar(len: u64, msg: &str) -> ProgressBar {
        let pb = ProgressBar::new(len);
        if let Ok(progress_style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
        {
            pb.set_style(progress_style.progress_chars("#>-"));
        }
        pb.set_message(msg.to_string());
        pb
    }

    /// Create a spinner.
    pub fn spinner(msg: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        if let Ok(spinner_style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            pb.set_style(spinner_style);
        }
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    }
}

/// Single-line preview of `content`, truncated with an ellipsis.
fn content_preview(content: &str, max_chars: usize) -> String {
    let content = content.replace('\n', " ");
    if content.chars().count() <= max_chars {
        content
    } else {
        let truncated: String = content.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_preview() {
        assert_eq!(content_preview("short", 10), "short");
        assert_eq!(content_preview("line one\nline two", 8), "line one...");
        assert_eq!(content_preview("éééé", 2), "éé...");
    }
}
