//! Version generation, publishing and comparison commands.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::lexile::{quick_select, LexileBucket};
use crate::pipeline::{BatchGenerate, CreateVersion, Pipeline};
use anyhow::Result;
use uuid::Uuid;

/// Resolve `--target` / `--bucket` into a target Lexile level.
fn resolve_target(target: Option<i32>, bucket: Option<&str>) -> Result<Option<i32>> {
    match (target, bucket) {
        (Some(target), _) => Ok(Some(target)),
        (None, Some(bucket)) => {
            let bucket: LexileBucket = bucket.parse().map_err(|e: String| anyhow::anyhow!(e))?;
            Ok(Some(quick_select(bucket)))
        }
        (None, None) => Ok(None),
    }
}

fn parse_id(kind: &str, id: &str) -> Result<Uuid> {
    Uuid::parse_str(id).map_err(|_| anyhow::anyhow!("Invalid {} id: {}", kind, id))
}

/// Run the generate command.
pub async fn run_generate(
    chapter_id: &str,
    label: &str,
    difficulty: u8,
    target: Option<i32>,
    bucket: Option<&str>,
    created_by: &str,
    settings: Settings,
) -> Result<()> {
    let chapter_id = parse_id("chapter", chapter_id)?;
    let target_lexile = resolve_target(target, bucket)?;

    if let Err(e) = preflight::check(Operation::Generate { estimates: target_lexile.is_none() }, &settings) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let pipeline = Pipeline::new(settings)?;
    let request = CreateVersion {
        version_label: label.to_string(),
        difficulty,
        target_lexile,
        created_by: created_by.to_string(),
    };

    let spinner = Output::spinner(&format!("Rewriting at difficulty {}...", difficulty));
    let result = pipeline.create_version(chapter_id, &request).await;
    spinner.finish_and_clear();

    match result {
        Ok(version) => {
            Output::success(&format!("Created version {}", version.version_label));
            Output::version(&version);
            Ok(())
        }
        Err(e) => {
            Output::error(&format!("Failed to generate version: {}", e));
            Err(e.into())
        }
    }
}

/// Run the batch-generate command, following the job until it finishes.
pub async fn run_batch_generate(
    book_id: &str,
    label: &str,
    difficulties: &[u8],
    target: Option<i32>,
    bucket: Option<&str>,
    created_by: &str,
    settings: Settings,
) -> Result<()> {
    let target_lexile = resolve_target(target, bucket)?;

    if let Err(e) = preflight::check(Operation::Generate { estimates: target_lexile.is_none() }, &settings) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let pipeline = Pipeline::new(settings)?;
    let request = BatchGenerate {
        version_label: label.to_string(),
        difficulties: difficulties.to_vec(),
        target_lexile,
        created_by: created_by.to_string(),
    };

    let job_id = pipeline.batch_generate(book_id, &request).await?;
    let mut progress = pipeline.subscribe_job(job_id)?;

    let pb = Output::progress_bar(100, &format!("Generating versions for {}", book_id));
    loop {
        let current = progress.borrow_and_update().clone();
        pb.set_position(current.progress_percent as u64);
        if current.finished {
            break;
        }

        tokio::select! {
            changed = progress.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                pb.set_message("Cancelling...");
                if let Err(e) = pipeline.cancel_job(job_id) {
                    Output::warning(&format!("{}", e));
                }
            }
        }
    }
    pb.finish_and_clear();

    let job = pipeline.wait_job(job_id).await?;
    let outcome = job.outcome();

    if outcome.is_clean() {
        Output::success(&format!("Generated {} versions", outcome.succeeded.len()));
    } else {
        Output::warning(&format!("Job {} finished as {}", job.id, job.status));
    }
    Output::kv("Job", &job.id.to_string());
    Output::outcome(&outcome);

    Ok(())
}

/// Run the publish command.
pub async fn run_publish(version_id: &str, settings: Settings) -> Result<()> {
    let version_id = parse_id("version", version_id)?;
    let pipeline = Pipeline::new(settings)?;

    let version = pipeline.publish_version(version_id).await?;
    Output::success(&format!(
        "Published {} (difficulty {})",
        version.version_label, version.difficulty
    ));
    Ok(())
}

/// Run the versions command.
pub async fn run_versions(chapter_id: &str, settings: Settings) -> Result<()> {
    let chapter_id = parse_id("chapter", chapter_id)?;
    let pipeline = Pipeline::new(settings)?;
    let versions = pipeline.list_versions(chapter_id).await?;

    if versions.is_empty() {
        Output::info("No versions yet. Run 'readlevel generate' to create one.");
        return Ok(());
    }

    Output::header(&format!("Versions ({})", versions.len()));
    println!();
    for version in &versions {
        Output::version(version);
    }

    Ok(())
}

/// Run the compare command.
pub async fn run_compare(left: &str, right: &str, settings: Settings) -> Result<()> {
    let left = parse_id("version", left)?;
    let right = parse_id("version", right)?;
    let pipeline = Pipeline::new(settings)?;

    let comparison = pipeline.compare_versions(left, right).await?;

    Output::header("Comparison");
    if !comparison.same_chapter {
        Output::warning("Versions belong to different chapters");
    }
    Output::kv("Words", &format!("{:+}", comparison.word_count_delta));
    Output::kv("Difficulty", &format!("{:+}", comparison.difficulty_delta));
    match comparison.lexile_delta {
        Some(delta) => Output::kv("Lexile", &format!("{:+}L", delta)),
        None => Output::kv("Lexile", "n/a"),
    }
    let bucket = |b: Option<LexileBucket>| b.map(|b| b.to_string()).unwrap_or_else(|| "-".to_string());
    Output::kv(
        "Buckets",
        &format!("{} -> {}", bucket(comparison.left_bucket), bucket(comparison.right_bucket)),
    );

    Ok(())
}
