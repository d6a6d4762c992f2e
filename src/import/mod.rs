//! Importing listening materials from external tables.
//!
//! Records come from a [`TableSource`] as loosely typed field maps. An
//! explicit [`FieldMapping`] says which source column feeds which material
//! field, and is checked against the fetched records before anything is
//! written.

use crate::error::{ReadLevelError, Result};
use crate::material::NewMaterial;
use crate::store::ContentStore;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// One row of an external table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRecord {
    pub record_id: String,
    pub fields: serde_json::Map<String, Value>,
}

#[async_trait]
pub trait TableSource: Send + Sync {
    async fn fetch_records(&self, table_id: &str) -> Result<Vec<TableRecord>>;
}

/// Reads `<dir>/<table_id>.json`, a JSON array of [`TableRecord`]s.
pub struct JsonTableSource {
    dir: PathBuf,
}

impl JsonTableSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn table_path(&self, table_id: &str) -> Result<PathBuf> {
        let valid = !table_id.is_empty()
            && table_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(ReadLevelError::Validation(format!("Invalid table id: '{}'", table_id)));
        }
        Ok(self.dir.join(format!("{}.json", table_id)))
    }
}

#[async_trait]
impl TableSource for JsonTableSource {
    #[instrument(skip(self))]
    async fn fetch_records(&self, table_id: &str) -> Result<Vec<TableRecord>> {
        let path = self.table_path(table_id)?;
        if !path.exists() {
            return Err(ReadLevelError::NotFound(format!(
                "Table {} not found at {}",
                table_id,
                path.display()
            )));
        }

        let content = tokio::fs::read_to_string(&path).await?;
        let records: Vec<TableRecord> = serde_json::from_str(&content)?;
        debug!("Read {} records from {}", records.len(), path.display());
        Ok(records)
    }
}

/// Material fields that can be filled from a table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialField {
    Title,
    Content,
    Category,
    Difficulty,
    AudioUrl,
    Tags,
}

impl std::fmt::Display for MaterialField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MaterialField::Title => "title",
            MaterialField::Content => "content",
            MaterialField::Category => "category",
            MaterialField::Difficulty => "difficulty",
            MaterialField::AudioUrl => "audio_url",
            MaterialField::Tags => "tags",
        };
        write!(f, "{}", name)
    }
}

/// Source column name -> material field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMapping(BTreeMap<String, MaterialField>);

impl FieldMapping {
    pub fn new(entries: impl IntoIterator<Item = (String, MaterialField)>) -> Self {
        Self(entries.into_iter().collect())
    }

    /// Check the mapping is complete, unambiguous, and refers to columns
    /// present in at least one record.
    pub fn validate(&self, records: &[TableRecord]) -> Result<()> {
        let mut targets = HashSet::new();
        for (source, target) in &self.0 {
            if source.trim().is_empty() {
                return Err(ReadLevelError::Validation("Mapping has an empty source field".to_string()));
            }
            if !targets.insert(*target) {
                return Err(ReadLevelError::Validation(format!(
                    "Material field '{}' is mapped more than once",
                    target
                )));
            }
        }

        for required in [MaterialField::Title, MaterialField::Content] {
            if !targets.contains(&required) {
                return Err(ReadLevelError::Validation(format!(
                    "Mapping must include a source for '{}'",
                    required
                )));
            }
        }

        if !records.is_empty() {
            for source in self.0.keys() {
                if !records.iter().any(|r| r.fields.contains_key(source)) {
                    return Err(ReadLevelError::Validation(format!(
                        "Source field '{}' does not appear in any record",
                        source
                    )));
                }
            }
        }
        Ok(())
    }

    fn source_for(&self, field: MaterialField) -> Option<&str> {
        self.0
            .iter()
            .find(|(_, target)| **target == field)
            .map(|(source, _)| source.as_str())
    }

    /// Build a material from a record.
    fn to_material(&self, record: &TableRecord) -> std::result::Result<NewMaterial, String> {
        let text = |field| {
            self.source_for(field)
                .and_then(|source| record.fields.get(source))
                .and_then(value_text)
                .filter(|s| !s.trim().is_empty())
        };

        let title = text(MaterialField::Title).ok_or("missing title")?;
        let content = text(MaterialField::Content).ok_or("missing content")?;

        let difficulty = match text(MaterialField::Difficulty) {
            Some(raw) => Some(
                raw.trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|d| d.fract() == 0.0 && (1.0..=5.0).contains(d))
                    .map(|d| d as u8)
                    .ok_or_else(|| format!("invalid difficulty '{}'", raw))?,
            ),
            None => None,
        };

        let tags = self
            .source_for(MaterialField::Tags)
            .and_then(|source| record.fields.get(source))
            .map(value_list)
            .unwrap_or_default();

        Ok(NewMaterial {
            title: title.trim().to_string(),
            content,
            category: text(MaterialField::Category),
            difficulty,
            tags,
            audio_url: text(MaterialField::AudioUrl),
            audio_source: None,
        })
    }
}

/// Flatten a table cell to text. Rich-text cells arrive as arrays of
/// `{"text": ...}` segments.
fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Object(map) => map
            .get("text")
            .or_else(|| map.get("link"))
            .and_then(value_text),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(value_text).collect();
            (!parts.is_empty()).then(|| parts.join(""))
        }
        Value::Null => None,
    }
}

/// Cell as a list: arrays item by item, strings split on commas.
fn value_list(value: &Value) -> Vec<String> {
    let raw: Vec<String> = match value {
        Value::Array(items) => items.iter().filter_map(value_text).collect(),
        other => value_text(other)
            .map(|s| s.split(',').map(str::to_string).collect())
            .unwrap_or_default(),
    };
    raw.into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportOptions {
    /// Skip records whose title matches an existing material exactly.
    pub skip_existing: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self { skip_existing: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportFailure {
    pub record_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportReport {
    pub imported: Vec<Uuid>,
    /// Titles skipped as already present.
    pub skipped: Vec<String>,
    pub failed: Vec<ImportFailure>,
}

/// Fetch a table, map its records and store them as pending materials.
#[instrument(skip(source, store, mapping))]
pub async fn import_materials(
    source: &dyn TableSource,
    store: &dyn ContentStore,
    table_id: &str,
    mapping: &FieldMapping,
    options: ImportOptions,
) -> Result<ImportReport> {
    let records = source.fetch_records(table_id).await?;
    mapping.validate(&records)?;

    let mut report = ImportReport::default();
    for record in &records {
        let material = match mapping
            .to_material(record)
            .and_then(|m| m.into_material().map_err(|e| e.to_string()))
        {
            Ok(material) => material,
            Err(reason) => {
                warn!("Skipping record {}: {}", record.record_id, reason);
                report.failed.push(ImportFailure {
                    record_id: record.record_id.clone(),
                    reason,
                });
                continue;
            }
        };

        if options.skip_existing && store.find_material_by_title(&material.title).await?.is_some() {
            debug!("'{}' already exists", material.title);
            report.skipped.push(material.title);
            continue;
        }

        store.insert_material(&material).await?;
        report.imported.push(material.id);
    }

    info!(
        "Imported {} materials from {} ({} skipped, {} failed)",
        report.imported.len(),
        table_id,
        report.skipped.len(),
        report.failed.len()
    );
    Ok(report)
}
