//! CLI module for Readlevel.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use clap::{Parser, Subcommand};

/// Readlevel - graded-reader content pipeline
///
/// Splits books into chapters, generates difficulty-adapted versions tagged
/// with Lexile levels, and prepares listening materials with audio and review.
#[derive(Parser, Debug)]
#[command(name = "readlevel")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "READLEVEL_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Split a book's text into chapters
    Split {
        /// Book identifier
        book_id: String,

        /// Text file with the book content
        file: String,

        /// Maximum words per chapter (default from config)
        #[arg(short, long)]
        max_words: Option<usize>,

        /// Strategy: paragraph, sentence, semantic, mixed (default from config)
        #[arg(short, long)]
        strategy: Option<String>,

        /// Replace the book's existing chapters
        #[arg(long)]
        replace: bool,
    },

    /// List the chapters of a book
    Chapters {
        /// Book identifier
        book_id: String,
    },

    /// Generate a difficulty-adapted version of a chapter
    Generate {
        /// Chapter id
        chapter_id: String,

        /// Version label, unique per chapter (e.g. 1.0.0)
        #[arg(short, long)]
        label: String,

        /// Difficulty from 1 (simplest) to 5
        #[arg(short, long)]
        difficulty: u8,

        /// Target Lexile level (200-1700)
        #[arg(short, long, conflicts_with = "bucket")]
        target: Option<i32>,

        /// Target the midpoint of a bucket: beginner, ket, pet, custom
        #[arg(short, long)]
        bucket: Option<String>,

        /// Author recorded on the version
        #[arg(long, default_value = "readlevel")]
        created_by: String,
    },

    /// Generate versions for every chapter of a book at several difficulties
    BatchGenerate {
        /// Book identifier
        book_id: String,

        /// Base version label; each version is labelled <label>-d<difficulty>
        #[arg(short, long)]
        label: String,

        /// Difficulties to generate, comma separated (e.g. 1,3,5)
        #[arg(short, long, value_delimiter = ',', required = true)]
        difficulties: Vec<u8>,

        /// Target Lexile level (200-1700)
        #[arg(short, long, conflicts_with = "bucket")]
        target: Option<i32>,

        /// Target the midpoint of a bucket: beginner, ket, pet, custom
        #[arg(short, long)]
        bucket: Option<String>,

        /// Author recorded on the versions
        #[arg(long, default_value = "readlevel")]
        created_by: String,
    },

    /// Publish a version, archiving the previous one at the same difficulty
    Publish {
        /// Version id
        version_id: String,
    },

    /// List versions of a chapter
    Versions {
        /// Chapter id
        chapter_id: String,
    },

    /// Compare two versions
    Compare {
        /// First version id
        left: String,
        /// Second version id
        right: String,
    },

    /// Classify a Lexile score into its bucket
    Classify {
        /// Lexile score
        #[arg(allow_negative_numbers = true)]
        score: i32,
    },

    /// Estimate the Lexile level of a text file
    Estimate {
        /// Text file to assess
        file: String,
    },

    /// Add a listening material
    AddMaterial {
        /// Title
        #[arg(short, long)]
        title: String,

        /// Text file with the material content
        file: String,

        /// Category
        #[arg(long)]
        category: Option<String>,

        /// Difficulty from 1 to 5
        #[arg(short, long)]
        difficulty: Option<u8>,

        /// Tags, comma separated
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
    },

    /// List listening materials
    Materials,

    /// Match audio to one or more listening materials
    MatchAudio {
        /// Material ids
        #[arg(required = true)]
        material_ids: Vec<String>,

        /// Source: tts, library, upload, external
        #[arg(short, long, default_value = "tts")]
        source: String,

        /// Audio URL for upload/external sources
        #[arg(short, long)]
        url: Option<String>,

        /// Voice (default from config)
        #[arg(long)]
        voice: Option<String>,

        /// Speech speed, 0.5-2.0 (default from config)
        #[arg(long)]
        speed: Option<f32>,

        /// Quality: low, medium, high (default from config)
        #[arg(long)]
        quality: Option<String>,

        /// Language code (default from config)
        #[arg(long)]
        language: Option<String>,
    },

    /// Review listening materials
    Review {
        /// Material ids
        #[arg(required = true)]
        material_ids: Vec<String>,

        /// Verdict: approved or rejected
        #[arg(long, required_unless_present = "reset")]
        verdict: Option<String>,

        /// Rating from 1 to 5
        #[arg(short, long, default_value = "3")]
        rating: u8,

        /// Review feedback
        #[arg(short, long, required_unless_present = "reset")]
        feedback: Option<String>,

        /// Reviewer name
        #[arg(long)]
        reviewer: Option<String>,

        /// Return the materials to pending instead of reviewing
        #[arg(long)]
        reset: bool,
    },

    /// Import listening materials from a table export
    Import {
        /// Table id (reads <records_dir>/<table_id>.json)
        table_id: String,

        /// Field mapping as SOURCE=FIELD, fields: title, content, category, difficulty, audio_url, tags
        #[arg(short, long = "map", required = true)]
        mappings: Vec<String>,

        /// Import records whose title already exists
        #[arg(long)]
        include_existing: bool,
    },

    /// Start HTTP API server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Open configuration file in editor
    Edit,

    /// Show configuration file path
    Path,
}
