//! Split and chapters command implementations.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::pipeline::Pipeline;
use crate::splitter::SplitStrategy;
use anyhow::Result;

/// Run the split command.
pub async fn run_split(
    book_id: &str,
    file: &str,
    max_words: Option<usize>,
    strategy: Option<&str>,
    replace: bool,
    settings: Settings,
) -> Result<()> {
    let strategy: Option<SplitStrategy> = strategy
        .map(|s| s.parse())
        .transpose()
        .map_err(|e: String| anyhow::anyhow!(e))?;

    let semantic = matches!(strategy, Some(SplitStrategy::Semantic | SplitStrategy::Mixed))
        || (strategy.is_none() && matches!(settings.splitting.strategy.as_str(), "semantic" | "mixed"));
    if let Err(e) = preflight::check(Operation::Split { semantic }, &settings) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let raw = std::fs::read_to_string(Settings::expand_path(file))
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", file, e))?;

    let pipeline = Pipeline::new(settings)?;

    let spinner = Output::spinner(&format!("Splitting '{}'...", book_id));
    let result = pipeline.split_book(book_id, &raw, max_words, strategy, replace).await;
    spinner.finish_and_clear();

    let chapters = match result {
        Ok(chapters) => chapters,
        Err(e) => {
            Output::error(&format!("Failed to split: {}", e));
            return Err(e.into());
        }
    };

    Output::success(&format!("Split '{}' into {} chapters", book_id, chapters.len()));
    println!();
    for chapter in &chapters {
        Output::chapter(chapter);
    }

    Ok(())
}

/// Run the chapters command.
pub async fn run_chapters(book_id: &str, settings: Settings) -> Result<()> {
    let pipeline = Pipeline::new(settings)?;
    let chapters = pipeline.list_chapters(book_id).await?;

    if chapters.is_empty() {
        Output::info(&format!("No chapters for '{}'. Run 'readlevel split' first.", book_id));
        return Ok(());
    }

    Output::header(&format!("Chapters of {} ({})", book_id, chapters.len()));
    println!();
    for chapter in &chapters {
        Output::chapter(chapter);
    }

    Ok(())
}
