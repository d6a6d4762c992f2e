//! Persistence for chapters, versions, materials and reviews.
//!
//! Invariants that span several records are enforced here, inside a single
//! lock or transaction: one published version per chapter and difficulty,
//! unique version labels per chapter, and the pending-only review transition.

mod memory;
mod sqlite;

pub use memory::MemoryContentStore;
pub use sqlite::SqliteContentStore;

use crate::audio::AudioMatch;
use crate::error::Result;
use crate::material::ListeningMaterial;
use crate::review::ReviewRecord;
use crate::splitter::Chapter;
use crate::versions::ChapterVersion;
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Save the chapters of a book. Without `replace`, an existing set is a conflict.
    async fn save_chapters(&self, book_id: &str, chapters: &[Chapter], replace: bool) -> Result<()>;

    /// Chapters of a book in order.
    async fn list_chapters(&self, book_id: &str) -> Result<Vec<Chapter>>;

    async fn get_chapter(&self, chapter_id: Uuid) -> Result<Option<Chapter>>;

    /// Insert a version; a duplicate label for the same chapter is a conflict.
    async fn insert_version(&self, version: &ChapterVersion) -> Result<()>;

    async fn get_version(&self, version_id: Uuid) -> Result<Option<ChapterVersion>>;

    /// Versions of a chapter, oldest first.
    async fn list_versions(&self, chapter_id: Uuid) -> Result<Vec<ChapterVersion>>;

    /// Publish a version and archive any other published version with the
    /// same chapter and difficulty.
    async fn publish_version(&self, version_id: Uuid) -> Result<ChapterVersion>;

    async fn delete_version(&self, version_id: Uuid) -> Result<()>;

    async fn insert_material(&self, material: &ListeningMaterial) -> Result<()>;

    /// Write only the audio fields of a material, leaving its review state alone.
    async fn set_audio(&self, material_id: Uuid, matched: &AudioMatch) -> Result<ListeningMaterial>;

    async fn get_material(&self, material_id: Uuid) -> Result<Option<ListeningMaterial>>;

    /// Exact title match.
    async fn find_material_by_title(&self, title: &str) -> Result<Option<ListeningMaterial>>;

    async fn list_materials(&self) -> Result<Vec<ListeningMaterial>>;

    /// Record a review and move the material out of `pending`.
    /// Fails with a conflict if the material is not pending.
    async fn apply_review(&self, record: &ReviewRecord) -> Result<ListeningMaterial>;

    /// Move a material back to `pending`.
    async fn reset_review(&self, material_id: Uuid) -> Result<ListeningMaterial>;

    /// Reviews of a material, oldest first.
    async fn list_reviews(&self, material_id: Uuid) -> Result<Vec<ReviewRecord>>;
}
