//! Readlevel - graded-reader content pipeline
//!
//! Turns long-form books into reading material at several difficulty levels
//! and prepares listening material for language learners.
//!
//! # Overview
//!
//! Readlevel allows you to:
//! - Split a book into chapters by paragraph, sentence or topic
//! - Generate difficulty-adapted versions of chapters tagged with Lexile levels
//! - Run batch generation as tracked, cancellable jobs
//! - Attach audio to listening materials and review them
//! - Import listening materials from table exports
//!
//! # Architecture
//!
//! - `config` - Configuration and prompt templates
//! - `splitter` - Chapter splitting strategies
//! - `lexile` - Lexile buckets, classification and estimation
//! - `versions` - Difficulty-adapted chapter versions
//! - `batch` - Batch job orchestration with progress tracking
//! - `material` - Listening materials
//! - `audio` - Audio matching (TTS, library, uploads)
//! - `review` - Listening material review workflow
//! - `import` - Table import with explicit field mapping
//! - `store` - Content persistence (SQLite or in-memory)
//! - `pipeline` - Wires everything behind the CLI and HTTP API
//!
//! # Example
//!
//! ```rust,no_run
//! use readlevel::config::Settings;
//! use readlevel::pipeline::{CreateVersion, Pipeline};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pipeline = Pipeline::new(Settings::load()?)?;
//!
//!     let text = std::fs::read_to_string("book.txt")?;
//!     let chapters = pipeline.split_book("book-1", &text, None, None, false).await?;
//!
//!     let request = CreateVersion {
//!         version_label: "1.0.0".to_string(),
//!         difficulty: 2,
//!         target_lexile: Some(550),
//!         created_by: "editor".to_string(),
//!     };
//!     let version = pipeline.create_version(chapters[0].id, &request).await?;
//!     println!("{} words at {:?}L", version.word_count, version.lexile_level);
//!
//!     Ok(())
//! }
//! ```

pub mod audio;
pub mod batch;
pub mod cli;
pub mod config;
pub mod error;
pub mod import;
pub mod lexile;
pub mod material;
pub mod openai;
pub mod pipeline;
pub mod retry;
pub mod review;
pub mod splitter;
pub mod store;
pub mod versions;

pub use error::{ReadLevelError, Result};
