//! In-memory content store.
//!
//! Useful for testing and for `store.provider = "memory"`.

use super::ContentStore;
use crate::audio::AudioMatch;
use crate::error::{ReadLevelError, Result};
use crate::material::{ListeningMaterial, ReviewStatus};
use crate::review::ReviewRecord;
use crate::splitter::Chapter;
use crate::versions::{ChapterVersion, VersionStatus};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

#[derive(Default)]
struct State {
    chapters: HashMap<String, Vec<Chapter>>,
    versions: HashMap<Uuid, ChapterVersion>,
    materials: HashMap<Uuid, ListeningMaterial>,
    reviews: Vec<ReviewRecord>,
}

#[derive(Default)]
pub struct MemoryContentStore {
    state: RwLock<State>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|e| ReadLevelError::Store(format!("Failed to acquire lock: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|e| ReadLevelError::Store(format!("Failed to acquire lock: {}", e)))
    }
}

fn material_not_found(id: Uuid) -> ReadLevelError {
    ReadLevelError::NotFound(format!("Material {} not found", id))
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn save_chapters(&self, book_id: &str, chapters: &[Chapter], replace: bool) -> Result<()> {
        let mut state = self.write()?;
        if !replace && state.chapters.get(book_id).is_some_and(|c| !c.is_empty()) {
            return Err(ReadLevelError::Conflict(format!(
                "Book {} already has chapters; re-split with replace to overwrite",
                book_id
            )));
        }
        state.chapters.insert(book_id.to_string(), chapters.to_vec());
        Ok(())
    }

    async fn list_chapters(&self, book_id: &str) -> Result<Vec<Chapter>> {
        let mut chapters = self.read()?.chapters.get(book_id).cloned().unwrap_or_default();
        chapters.sort_by_key(|c| c.order);
        Ok(chapters)
    }

    async fn get_chapter(&self, chapter_id: Uuid) -> Result<Option<Chapter>> {
        Ok(self
            .read()?
            .chapters
            .values()
            .flatten()
            .find(|c| c.id == chapter_id)
            .cloned())
    }

    async fn insert_version(&self, version: &ChapterVersion) -> Result<()> {
        let mut state = self.write()?;
        let duplicate = state
            .versions
            .values()
            .any(|v| v.chapter_id == version.chapter_id && v.version_label == version.version_label);
        if duplicate {
            return Err(ReadLevelError::Conflict(format!(
                "Version '{}' already exists for chapter {}",
                version.version_label, version.chapter_id
            )));
        }
        state.versions.insert(version.id, version.clone());
        Ok(())
    }

    async fn get_version(&self, version_id: Uuid) -> Result<Option<ChapterVersion>> {
        Ok(self.read()?.versions.get(&version_id).cloned())
    }

    async fn list_versions(&self, chapter_id: Uuid) -> Result<Vec<ChapterVersion>> {
        let mut versions: Vec<ChapterVersion> = self
            .read()?
            .versions
            .values()
            .filter(|v| v.chapter_id == chapter_id)
            .cloned()
            .collect();
        versions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(versions)
    }

    async fn publish_version(&self, version_id: Uuid) -> Result<ChapterVersion> {
        let mut state = self.write()?;
        let (chapter_id, difficulty) = state
            .versions
            .get(&version_id)
            .map(|v| (v.chapter_id, v.difficulty))
            .ok_or_else(|| ReadLevelError::NotFound(format!("Version {} not found", version_id)))?;

        for v in state.versions.values_mut() {
            if v.id == version_id {
                v.status = VersionStatus::Published;
            } else if v.chapter_id == chapter_id
                && v.difficulty == difficulty
                && v.status == VersionStatus::Published
            {
                v.status = VersionStatus::Archived;
            }
        }

        state
            .versions
            .get(&version_id)
            .cloned()
            .ok_or_else(|| ReadLevelError::NotFound(format!("Version {} not found", version_id)))
    }

    async fn delete_version(&self, version_id: Uuid) -> Result<()> {
        self.write()?
            .versions
            .remove(&version_id)
            .map(|_| ())
            .ok_or_else(|| ReadLevelError::NotFound(format!("Version {} not found", version_id)))
    }

    async fn insert_material(&self, material: &ListeningMaterial) -> Result<()> {
        let mut state = self.write()?;
        if state.materials.contains_key(&material.id) {
            return Err(ReadLevelError::Conflict(format!("Material {} already exists", material.id)));
        }
        state.materials.insert(material.id, material.clone());
        Ok(())
    }

    async fn set_audio(&self, material_id: Uuid, matched: &AudioMatch) -> Result<ListeningMaterial> {
        let mut state = self.write()?;
        let material = state
            .materials
            .get_mut(&material_id)
            .ok_or_else(|| material_not_found(material_id))?;
        matched.apply_to(material);
        Ok(material.clone())
    }

    async fn get_material(&self, material_id: Uuid) -> Result<Option<ListeningMaterial>> {
        Ok(self.read()?.materials.get(&material_id).cloned())
    }

    async fn find_material_by_title(&self, title: &str) -> Result<Option<ListeningMaterial>> {
        Ok(self
            .read()?
            .materials
            .values()
            .find(|m| m.title == title)
            .cloned())
    }

    async fn list_materials(&self) -> Result<Vec<ListeningMaterial>> {
        let mut materials: Vec<ListeningMaterial> = self.read()?.materials.values().cloned().collect();
        materials.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(materials)
    }

    async fn apply_review(&self, record: &ReviewRecord) -> Result<ListeningMaterial> {
        let mut state = self.write()?;
        let material = state
            .materials
            .get_mut(&record.material_id)
            .ok_or_else(|| material_not_found(record.material_id))?;

        if material.review_status != ReviewStatus::Pending {
            return Err(ReadLevelError::Conflict(format!(
                "Material {} is already {}",
                record.material_id, material.review_status
            )));
        }
        material.review_status = record.status;
        material.updated_at = Utc::now();
        let updated = material.clone();

        state.reviews.push(record.clone());
        Ok(updated)
    }

    async fn reset_review(&self, material_id: Uuid) -> Result<ListeningMaterial> {
        let mut state = self.write()?;
        let material = state
            .materials
            .get_mut(&material_id)
            .ok_or_else(|| material_not_found(material_id))?;
        material.review_status = ReviewStatus::Pending;
        material.updated_at = Utc::now();
        Ok(material.clone())
    }

    async fn list_reviews(&self, material_id: Uuid) -> Result<Vec<ReviewRecord>> {
        Ok(self
            .read()?
            .reviews
            .iter()
            .filter(|r| r.material_id == material_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::super::contract;
    use super::*;

    #[tokio::test]
    async fn test_chapters() {
        contract::chapters_are_immutable_unless_replaced(&MemoryContentStore::new()).await;
    }

    #[tokio::test]
    async fn test_version_labels() {
        contract::version_labels_are_unique_per_chapter(&MemoryContentStore::new()).await;
    }

    #[tokio::test]
    async fn test_publish() {
        contract::publish_archives_previous(&MemoryContentStore::new()).await;
    }

    #[tokio::test]
    async fn test_delete_version() {
        contract::delete_version(&MemoryContentStore::new()).await;
    }

    #[tokio::test]
    async fn test_materials() {
        contract::materials_round_trip(&MemoryContentStore::new()).await;
    }

    #[tokio::test]
    async fn test_reviews() {
        contract::review_transition_is_pending_only(&MemoryContentStore::new()).await;
    }

    #[tokio::test]
    async fn test_set_audio() {
        contract::set_audio_keeps_review_state(&MemoryContentStore::new()).await;
    }
}
