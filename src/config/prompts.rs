//! Prompt templates for Readlevel.
//!
//! Prompts can be customized by placing TOML files in the custom prompts directory.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Collection of all prompt templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Prompts {
    pub rewrite: RewritePrompts,
    pub assessment: AssessmentPrompts,
    pub segmentation: SegmentationPrompts,
    /// Custom variables from config, available in all prompts.
    #[serde(skip)]
    pub variables: HashMap<String, String>,
}

/// Prompts for difficulty-adapted rewriting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewritePrompts {
    pub system: String,
    pub user: String,
}

impl Default for RewritePrompts {
    fn default() -> Self {
        Self {
            system: r#"You are an editor of graded readers for young English learners. You rewrite passages so that a child at a given reading level can follow them.

Rules:
- Keep the plot, characters, and order of events.
- Do not add commentary, headings, or notes.
- Keep paragraph breaks as blank lines.
- Output only the rewritten passage."#
                .to_string(),

            user: r#"Rewrite the passage below for difficulty level {{difficulty}} on a 1-5 scale (1 = simplest words and shortest sentences, 5 = close to the original).
{{target_hint}}

Passage:
{{content}}"#
                .to_string(),
        }
    }
}

/// Prompts for Lexile estimation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssessmentPrompts {
    pub system: String,
    pub user: String,
}

impl Default for AssessmentPrompts {
    fn default() -> Self {
        Self {
            system: r#"You estimate Lexile reading measures for English text. Answer with a single JSON object and nothing else."#
                .to_string(),

            user: r#"Estimate the Lexile measure (between 200 and 1700) of text built from these words:

{{words}}

Respond as {"lexile": <integer>, "confidence": <0-1>}."#
                .to_string(),
        }
    }
}

/// Prompts for topic segmentation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationPrompts {
    pub system: String,
    pub user: String,
}

impl Default for SegmentationPrompts {
    fn default() -> Self {
        Self {
            system: r#"You find topic and scene boundaries in long-form prose. You only report where new sections begin; you never rewrite text."#
                .to_string(),

            user: r#"The book text below is split into numbered paragraphs. Identify the paragraphs that begin a new chapter, scene, or topic.

{{paragraphs}}

Respond with a JSON array of paragraph numbers, e.g. [0, 14, 31]. Paragraph 0 always starts the first section."#
                .to_string(),
        }
    }
}

impl Prompts {
    /// Load prompts from the default location, with optional custom directory and variables.
    pub fn load(
        custom_dir: Option<&str>,
        custom_variables: Option<&HashMap<String, String>>,
    ) -> crate::error::Result<Self> {
        let mut prompts = Prompts::default();

        if let Some(vars) = custom_variables {
            prompts.variables = vars.clone();
        }

        if let Some(dir) = custom_dir {
            let custom_path = PathBuf::from(shellexpand::tilde(dir).to_string());

            let rewrite_path = custom_path.join("rewrite.toml");
            if rewrite_path.exists() {
                let content = std::fs::read_to_string(&rewrite_path)?;
                prompts.rewrite = toml::from_str(&content)?;
            }

            let assessment_path = custom_path.join("assessment.toml");
            if assessment_path.exists() {
                let content = std::fs::read_to_string(&assessment_path)?;
                prompts.assessment = toml::from_str(&content)?;
            }

            let segmentation_path = custom_path.join("segmentation.toml");
            if segmentation_path.exists() {
                let content = std::fs::read_to_string(&segmentation_path)?;
                prompts.segmentation = toml::from_str(&content)?;
            }
        }

        Ok(prompts)
    }

    /// Render a prompt template with the given variables.
    pub fn render(template: &str, vars: &HashMap<String, String>) -> String {
        let mut result = template.to_string();
        for (key, value) in vars {
            result = result.replace(&format!("{{{{{}}}}}", key), value);
        }
        result
    }

    /// Render a prompt template with both provided variables and custom config variables.
    /// Provided variables take precedence over custom config variables.
    pub fn render_with_custom(&self, template: &str, vars: &HashMap<String, String>) -> String {
        let mut merged = self.variables.clone();
        for (key, value) in vars {
            merged.insert(key.clone(), value.clone());
        }
        Self::render(template, &merged)
    }
}
