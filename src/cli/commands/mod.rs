//! CLI command implementations.

mod config;
mod lexile;
mod listening;
mod serve;
mod split;
mod versions;

pub use config::run_config;
pub use lexile::{run_classify, run_estimate};
pub use listening::{run_add_material, run_import, run_match_audio, run_materials, run_review, AudioArgs};
pub use serve::{router, run_serve};
pub use split::{run_chapters, run_split};
pub use versions::{run_batch_generate, run_compare, run_generate, run_publish, run_versions};
