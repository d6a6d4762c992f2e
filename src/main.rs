//! Readlevel CLI entry point.

use anyhow::Result;
use clap::Parser;
use readlevel::cli::{commands, Cli, Commands};
use readlevel::config::Settings;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_path = cli.config.as_deref().map(PathBuf::from);
    let settings = Settings::load_from(config_path.as_ref())?;

    // Initialize logging
    let log_level = match cli.verbose {
        0 => settings.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("readlevel={}", log_level)),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Ensure data directories exist
    std::fs::create_dir_all(settings.data_dir())?;

    // Execute command
    match &cli.command {
        Commands::Split {
            book_id,
            file,
            max_words,
            strategy,
            replace,
        } => {
            commands::run_split(book_id, file, *max_words, strategy.as_deref(), *replace, settings).await?;
        }

        Commands::Chapters { book_id } => {
            commands::run_chapters(book_id, settings).await?;
        }

        Commands::Generate {
            chapter_id,
            label,
            difficulty,
            target,
            bucket,
            created_by,
        } => {
            commands::run_generate(
                chapter_id,
                label,
                *difficulty,
                *target,
                bucket.as_deref(),
                created_by,
                settings,
            )
            .await?;
        }

        Commands::BatchGenerate {
            book_id,
            label,
            difficulties,
            target,
            bucket,
            created_by,
        } => {
            commands::run_batch_generate(
                book_id,
                label,
                difficulties,
                *target,
                bucket.as_deref(),
                created_by,
                settings,
            )
            .await?;
        }

        Commands::Publish { version_id } => {
            commands::run_publish(version_id, settings).await?;
        }

        Commands::Versions { chapter_id } => {
            commands::run_versions(chapter_id, settings).await?;
        }

        Commands::Compare { left, right } => {
            commands::run_compare(left, right, settings).await?;
        }

        Commands::Classify { score } => {
            commands::run_classify(*score)?;
        }

        Commands::Estimate { file } => {
            commands::run_estimate(file, settings).await?;
        }

        Commands::AddMaterial {
            title,
            file,
            category,
            difficulty,
            tags,
        } => {
            commands::run_add_material(title, file, category.clone(), *difficulty, tags.clone(), settings).await?;
        }

        Commands::Materials => {
            commands::run_materials(settings).await?;
        }

        Commands::MatchAudio {
            material_ids,
            source,
            url,
            voice,
            speed,
            quality,
            language,
        } => {
            let args = commands::AudioArgs {
                source: source.clone(),
                url: url.clone(),
                voice: voice.clone(),
                speed: *speed,
                quality: quality.clone(),
                language: language.clone(),
            };
            commands::run_match_audio(material_ids, args, settings).await?;
        }

        Commands::Review {
            material_ids,
            verdict,
            rating,
            feedback,
            reviewer,
            reset,
        } => {
            commands::run_review(
                material_ids,
                verdict.as_deref(),
                *rating,
                feedback.clone(),
                reviewer.clone(),
                *reset,
                settings,
            )
            .await?;
        }

        Commands::Import {
            table_id,
            mappings,
            include_existing,
        } => {
            commands::run_import(table_id, mappings, *include_existing, settings).await?;
        }

        Commands::Serve { host, port } => {
            commands::run_serve(host, *port, settings).await?;
        }

        Commands::Config { action } => {
            commands::run_config(action, config_path, settings)?;
        }
    }

    Ok(())
}
