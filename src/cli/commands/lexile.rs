//! Lexile classify and estimate commands.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::lexile::{classify, recommended_range, Classification};
use crate::pipeline::Pipeline;
use anyhow::Result;

fn print_classification(classification: &Classification) {
    let (low, high) = recommended_range(classification.score);
    Output::kv("Score", &format!("{}L", classification.score));
    Output::kv("Bucket", &classification.bucket.to_string());
    Output::kv("Label", &classification.label);
    Output::kv("Range", &format!("{}L - {}L", low, high));
}

/// Run the classify command. Works offline.
pub fn run_classify(score: i32) -> Result<()> {
    let classification = classify(score)?;
    if classification.score != score {
        Output::warning(&format!("Score {} clamped to {}", score, classification.score));
    }
    print_classification(&classification);
    Ok(())
}

/// Run the estimate command.
pub async fn run_estimate(file: &str, settings: Settings) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Estimate, &settings) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let text = std::fs::read_to_string(Settings::expand_path(file))
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", file, e))?;

    let pipeline = Pipeline::new(settings)?;

    let spinner = Output::spinner("Estimating Lexile level...");
    let result = pipeline.estimate(&text).await;
    spinner.finish_and_clear();

    match result {
        Ok(classification) => {
            print_classification(&classification);
            Ok(())
        }
        Err(e) => {
            Output::error(&format!("Failed to estimate: {}", e));
            Err(e.into())
        }
    }
}
