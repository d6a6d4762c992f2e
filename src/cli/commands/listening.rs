//! Listening material commands: add, list, audio matching, review, import.

use crate::audio::{AudioConfig, AudioQuality};
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::import::{FieldMapping, ImportOptions, MaterialField};
use crate::material::{AudioSource, NewMaterial};
use crate::pipeline::Pipeline;
use crate::review::{ReviewDecision, ReviewVerdict};
use anyhow::Result;
use uuid::Uuid;

fn parse_ids(ids: &[String]) -> Result<Vec<Uuid>> {
    ids.iter()
        .map(|id| Uuid::parse_str(id).map_err(|_| anyhow::anyhow!("Invalid material id: {}", id)))
        .collect()
}

/// Run the add-material command.
pub async fn run_add_material(
    title: &str,
    file: &str,
    category: Option<String>,
    difficulty: Option<u8>,
    tags: Vec<String>,
    settings: Settings,
) -> Result<()> {
    let content = std::fs::read_to_string(Settings::expand_path(file))
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", file, e))?;

    let pipeline = Pipeline::new(settings)?;
    let material = pipeline
        .add_material(NewMaterial {
            title: title.to_string(),
            content,
            category,
            difficulty,
            tags,
            ..Default::default()
        })
        .await?;

    Output::success(&format!("Added '{}'", material.title));
    Output::material(&material);
    Ok(())
}

/// Run the materials command.
pub async fn run_materials(settings: Settings) -> Result<()> {
    let pipeline = Pipeline::new(settings)?;
    let materials = pipeline.list_materials().await?;

    if materials.is_empty() {
        Output::info("No listening materials yet. Use 'readlevel add-material' or 'readlevel import'.");
        return Ok(());
    }

    Output::header(&format!("Listening materials ({})", materials.len()));
    println!();
    for material in &materials {
        Output::material(material);
    }
    Ok(())
}

/// Audio options given on the command line. Unset fields fall back to `tts` settings.
pub struct AudioArgs {
    pub source: String,
    pub url: Option<String>,
    pub voice: Option<String>,
    pub speed: Option<f32>,
    pub quality: Option<String>,
    pub language: Option<String>,
}

impl AudioArgs {
    fn into_config(self, settings: &Settings) -> Result<AudioConfig> {
        let source: AudioSource = self.source.parse().map_err(|e: String| anyhow::anyhow!(e))?;
        let quality: AudioQuality = self
            .quality
            .as_deref()
            .unwrap_or(&settings.tts.default_quality)
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?;

        Ok(AudioConfig {
            source,
            language: self.language.unwrap_or_else(|| settings.tts.default_language.clone()),
            voice: self.voice.unwrap_or_else(|| settings.tts.default_voice.clone()),
            speed: self.speed.unwrap_or(settings.tts.default_speed),
            quality,
            url: self.url,
        })
    }
}

/// Run the match-audio command.
pub async fn run_match_audio(material_ids: &[String], args: AudioArgs, settings: Settings) -> Result<()> {
    let ids = parse_ids(material_ids)?;
    let config = args.into_config(&settings)?;

    if let Err(e) = preflight::check(Operation::MatchAudio(config.source), &settings) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let pipeline = Pipeline::new(settings)?;

    if let [id] = ids.as_slice() {
        let spinner = Output::spinner(&format!("Matching {} audio...", config.source));
        let result = pipeline.match_audio(*id, &config).await;
        spinner.finish_and_clear();

        let material = result?;
        Output::success(&format!("Matched audio for '{}'", material.title));
        Output::material(&material);
        return Ok(());
    }

    let job_id = pipeline.batch_match(&ids, config).await?;
    let mut progress = pipeline.subscribe_job(job_id)?;
    let pb = Output::progress_bar(100, &format!("Matching audio for {} materials", ids.len()));
    while !progress.borrow().finished {
        pb.set_position(progress.borrow().progress_percent as u64);
        if progress.changed().await.is_err() {
            break;
        }
    }
    pb.finish_and_clear();

    let job = pipeline.wait_job(job_id).await?;
    Output::header("Audio matching");
    Output::outcome(&job.outcome());
    Ok(())
}

/// Run the review command.
pub async fn run_review(
    material_ids: &[String],
    verdict: Option<&str>,
    rating: u8,
    feedback: Option<String>,
    reviewer: Option<String>,
    reset: bool,
    settings: Settings,
) -> Result<()> {
    let ids = parse_ids(material_ids)?;
    let pipeline = Pipeline::new(settings)?;

    if reset {
        for id in &ids {
            match pipeline.reset_review(*id).await {
                Ok(material) => Output::success(&format!("'{}' is pending again", material.title)),
                Err(e) => Output::error(&format!("{}: {}", id, e)),
            }
        }
        return Ok(());
    }

    let verdict: ReviewVerdict = verdict
        .ok_or_else(|| anyhow::anyhow!("--verdict is required"))?
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;
    let decision = ReviewDecision {
        verdict,
        rating,
        feedback: feedback.unwrap_or_default(),
        reviewer,
    };

    if let [id] = ids.as_slice() {
        let record = pipeline.review(*id, &decision).await?;
        Output::success(&format!("Material {} {}", id, record.status));
        return Ok(());
    }

    let outcome = pipeline.batch_review(&ids, &decision).await?;
    Output::header("Review");
    Output::outcome(&outcome);
    Ok(())
}

/// Parse `SOURCE=FIELD` pairs into a field mapping.
fn parse_mapping(entries: &[String]) -> Result<FieldMapping> {
    let pairs = entries
        .iter()
        .map(|entry| {
            let (source, field) = entry
                .split_once('=')
                .ok_or_else(|| anyhow::anyhow!("Mapping must look like SOURCE=FIELD: {}", entry))?;
            let field: MaterialField =
                serde_json::from_value(serde_json::Value::String(field.trim().to_lowercase()))
                    .map_err(|_| anyhow::anyhow!("Unknown material field: {}", field))?;
            Ok((source.trim().to_string(), field))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(FieldMapping::new(pairs))
}

/// Run the import command.
pub async fn run_import(
    table_id: &str,
    mappings: &[String],
    include_existing: bool,
    settings: Settings,
) -> Result<()> {
    let mapping = parse_mapping(mappings)?;
    let options = include_existing.then_some(ImportOptions { skip_existing: false });

    let pipeline = Pipeline::new(settings)?;

    let spinner = Output::spinner(&format!("Importing table {}...", table_id));
    let result = pipeline.import_materials(table_id, &mapping, options).await;
    spinner.finish_and_clear();

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            Output::error(&format!("Import failed: {}", e));
            return Err(e.into());
        }
    };

    Output::success(&format!("Imported {} materials", report.imported.len()));
    if !report.skipped.is_empty() {
        Output::info(&format!("Skipped {} existing titles", report.skipped.len()));
        for title in &report.skipped {
            Output::list_item(title);
        }
    }
    for failure in &report.failed {
        Output::warning(&format!("{}: {}", failure.record_id, failure.reason));
    }
    Ok(())
}
