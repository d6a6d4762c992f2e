//! Configuration module for Readlevel.
//!
//! Handles loading and managing application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{AssessmentPrompts, Prompts, RewritePrompts, SegmentationPrompts};
pub use settings::{
    AssessmentProvider, AssessmentSettings, BatchSettings, GeneralSettings, ImportSettings,
    LibrarySettings, PromptSettings, RewriteSettings, Settings, SplittingSettings, StoreProvider,
    StoreSettings, TtsSettings,
};
