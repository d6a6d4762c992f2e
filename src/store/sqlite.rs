//! SQLite content store.

use super::ContentStore;
use crate::audio::AudioMatch;
use crate::error::{ReadLevelError, Result};
use crate::material::{ListeningMaterial, ReviewStatus};
use crate::review::ReviewRecord;
use crate::splitter::Chapter;
use crate::versions::{ChapterVersion, VersionStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument};
use uuid::Uuid;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS chapters (
        id TEXT PRIMARY KEY,
        book_id TEXT NOT NULL,
        chapter_order INTEGER NOT NULL,
        title TEXT NOT NULL DEFAULT '',
        raw_content TEXT NOT NULL,
        word_count INTEGER NOT NULL,
        UNIQUE (book_id, chapter_order)
    );

    CREATE TABLE IF NOT EXISTS versions (
        id TEXT PRIMARY KEY,
        chapter_id TEXT NOT NULL,
        version_label TEXT NOT NULL,
        difficulty INTEGER NOT NULL,
        lexile_level INTEGER,
        lexile_source TEXT NOT NULL,
        content TEXT NOT NULL,
        word_count INTEGER NOT NULL,
        status TEXT NOT NULL,
        quality TEXT,
        created_by TEXT NOT NULL,
        created_at TEXT NOT NULL,
        UNIQUE (chapter_id, version_label)
    );

    CREATE INDEX IF NOT EXISTS idx_versions_chapter ON versions(chapter_id, difficulty);

    CREATE TABLE IF NOT EXISTS materials (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        content TEXT NOT NULL,
        category TEXT,
        difficulty INTEGER,
        tags_json TEXT NOT NULL,
        audio_url TEXT,
        audio_source TEXT,
        match_confidence REAL,
        review_status TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_materials_title ON materials(title);

    CREATE TABLE IF NOT EXISTS reviews (
        id TEXT PRIMARY KEY,
        material_id TEXT NOT NULL,
        status TEXT NOT NULL,
        rating INTEGER NOT NULL,
        feedback TEXT NOT NULL,
        reviewer TEXT,
        reviewed_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_reviews_material ON reviews(material_id);
"#;

/// Columns added after the first release, created on open when missing.
const ADDED_COLUMNS: &[(&str, &str, &str)] = &[
    ("chapters", "title", "TEXT NOT NULL DEFAULT ''"),
    ("versions", "quality", "TEXT"),
];

const CHAPTER_COLUMNS: &str = "id, book_id, chapter_order, title, raw_content, word_count";

const VERSION_COLUMNS: &str = "id, chapter_id, version_label, difficulty, lexile_level, lexile_source, \
     content, word_count, status, quality, created_by, created_at";

const MATERIAL_COLUMNS: &str = "id, title, content, category, difficulty, tags_json, audio_url, \
     audio_source, match_confidence, review_status, updated_at";

pub struct SqliteContentStore {
    conn: Mutex<Connection>,
}

impl SqliteContentStore {
    /// Open (or create) a store at `path`.
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;
        add_missing_columns(&conn)?;

        info!("Initialized SQLite content store at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| ReadLevelError::Store(format!("Failed to acquire lock: {}", e)))
    }

    fn load_material(conn: &Connection, id: Uuid) -> Result<Option<ListeningMaterial>> {
        Ok(conn
            .query_row(
                &format!("SELECT {} FROM materials WHERE id = ?1", MATERIAL_COLUMNS),
                params![id.to_string()],
                material_from_row,
            )
            .optional()?)
    }

    fn load_version(conn: &Connection, id: Uuid) -> Result<Option<ChapterVersion>> {
        Ok(conn
            .query_row(
                &format!("SELECT {} FROM versions WHERE id = ?1", VERSION_COLUMNS),
                params![id.to_string()],
                version_from_row,
            )
            .optional()?)
    }
}

fn add_missing_columns(conn: &Connection) -> Result<()> {
    for (table, column, definition) in ADDED_COLUMNS {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
        let exists = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<rusqlite::Result<Vec<_>>>()?
            .iter()
            .any(|name| name == column);
        if !exists {
            conn.execute_batch(&format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, definition))?;
            info!("Added column {}.{}", table, column);
        }
    }
    Ok(())
}

/// Parse a text column, reporting failures as conversion errors on `idx`.
fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let text: String = row.get(idx)?;
    text.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

fn parse_optional_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let text: Option<String> = row.get(idx)?;
    text.map(|t| {
        t.parse::<T>()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
    })
    .transpose()
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn chapter_from_row(row: &Row<'_>) -> rusqlite::Result<Chapter> {
    let order: u32 = row.get(2)?;
    let title: String = row.get(3)?;
    Ok(Chapter {
        id: parse_column(row, 0)?,
        book_id: row.get(1)?,
        order,
        title: if title.is_empty() { Chapter::fallback_title(order) } else { title },
        raw_content: row.get(4)?,
        word_count: row.get::<_, i64>(5)? as usize,
    })
}

fn version_from_row(row: &Row<'_>) -> rusqlite::Result<ChapterVersion> {
    Ok(ChapterVersion {
        id: parse_column(row, 0)?,
        chapter_id: parse_column(row, 1)?,
        version_label: row.get(2)?,
        difficulty: row.get(3)?,
        lexile_level: row.get(4)?,
        lexile_source: parse_column(row, 5)?,
        content: row.get(6)?,
        word_count: row.get::<_, i64>(7)? as usize,
        status: parse_column(row, 8)?,
        quality: row
            .get::<_, Option<String>>(9)?
            .map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(9, Type::Text, Box::new(e)))?,
        created_by: row.get(10)?,
        created_at: timestamp_column(row, 11)?,
    })
}

fn material_from_row(row: &Row<'_>) -> rusqlite::Result<ListeningMaterial> {
    let tags_json: String = row.get(5)?;
    let tags = serde_json::from_str(&tags_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;

    Ok(ListeningMaterial {
        id: parse_column(row, 0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        category: row.get(3)?,
        difficulty: row.get(4)?,
        tags,
        audio_url: row.get(6)?,
        audio_source: parse_optional_column(row, 7)?,
        match_confidence: row.get::<_, Option<f64>>(8)?.map(|c| c as f32),
        review_status: parse_column(row, 9)?,
        updated_at: timestamp_column(row, 10)?,
    })
}

fn review_from_row(row: &Row<'_>) -> rusqlite::Result<ReviewRecord> {
    Ok(ReviewRecord {
        id: parse_column(row, 0)?,
        material_id: parse_column(row, 1)?,
        status: parse_column(row, 2)?,
        rating: row.get(3)?,
        feedback: row.get(4)?,
        reviewer: row.get(5)?,
        reviewed_at: timestamp_column(row, 6)?,
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation)
}

fn insert_material_row(conn: &Connection, material: &ListeningMaterial) -> Result<usize> {
    Ok(conn.execute(
        &format!(
            "INSERT INTO materials ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            MATERIAL_COLUMNS
        ),
        params![
            material.id.to_string(),
            material.title,
            material.content,
            material.category,
            material.difficulty,
            serde_json::to_string(&material.tags)?,
            material.audio_url,
            material.audio_source.map(|s| s.to_string()),
            material.match_confidence.map(f64::from),
            material.review_status.to_string(),
            material.updated_at.to_rfc3339(),
        ],
    )?)
}

#[async_trait]
impl ContentStore for SqliteContentStore {
    #[instrument(skip(self, chapters), fields(count = chapters.len()))]
    async fn save_chapters(&self, book_id: &str, chapters: &[Chapter], replace: bool) -> Result<()> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        let existing: i64 = tx.query_row(
            "SELECT COUNT(*) FROM chapters WHERE book_id = ?1",
            params![book_id],
            |row| row.get(0),
        )?;
        if existing > 0 {
            if !replace {
                return Err(ReadLevelError::Conflict(format!(
                    "Book {} already has chapters; re-split with replace to overwrite",
                    book_id
                )));
            }
            tx.execute("DELETE FROM chapters WHERE book_id = ?1", params![book_id])?;
        }

        for chapter in chapters {
            tx.execute(
                &format!("INSERT INTO chapters ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)", CHAPTER_COLUMNS),
                params![
                    chapter.id.to_string(),
                    book_id,
                    chapter.order,
                    chapter.title,
                    chapter.raw_content,
                    chapter.word_count as i64,
                ],
            )?;
        }

        tx.commit()?;
        debug!("Saved {} chapters for {}", chapters.len(), book_id);
        Ok(())
    }

    async fn list_chapters(&self, book_id: &str) -> Result<Vec<Chapter>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM chapters WHERE book_id = ?1 ORDER BY chapter_order",
            CHAPTER_COLUMNS
        ))?;
        let chapters = stmt
            .query_map(params![book_id], chapter_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(chapters)
    }

    async fn get_chapter(&self, chapter_id: Uuid) -> Result<Option<Chapter>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                &format!("SELECT {} FROM chapters WHERE id = ?1", CHAPTER_COLUMNS),
                params![chapter_id.to_string()],
                chapter_from_row,
            )
            .optional()?)
    }

    #[instrument(skip(self, version), fields(label = %version.version_label))]
    async fn insert_version(&self, version: &ChapterVersion) -> Result<()> {
        let conn = self.conn()?;
        let quality = version.quality.as_ref().map(serde_json::to_string).transpose()?;
        let result = conn.execute(
            &format!(
                "INSERT INTO versions ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                VERSION_COLUMNS
            ),
            params![
                version.id.to_string(),
                version.chapter_id.to_string(),
                version.version_label,
                version.difficulty,
                version.lexile_level,
                version.lexile_source.to_string(),
                version.content,
                version.word_count as i64,
                version.status.to_string(),
                quality,
                version.created_by,
                version.created_at.to_rfc3339(),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(ReadLevelError::Conflict(format!(
                "Version '{}' already exists for chapter {}",
                version.version_label, version.chapter_id
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_version(&self, version_id: Uuid) -> Result<Option<ChapterVersion>> {
        let conn = self.conn()?;
        Self::load_version(&conn, version_id)
    }

    async fn list_versions(&self, chapter_id: Uuid) -> Result<Vec<ChapterVersion>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM versions WHERE chapter_id = ?1 ORDER BY created_at, rowid",
            VERSION_COLUMNS
        ))?;
        let versions = stmt
            .query_map(params![chapter_id.to_string()], version_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(versions)
    }

    #[instrument(skip(self))]
    async fn publish_version(&self, version_id: Uuid) -> Result<ChapterVersion> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        let version = Self::load_version(&tx, version_id)?
            .ok_or_else(|| ReadLevelError::NotFound(format!("Version {} not found", version_id)))?;

        let archived = tx.execute(
            "UPDATE versions SET status = ?1 \
             WHERE chapter_id = ?2 AND difficulty = ?3 AND status = ?4 AND id != ?5",
            params![
                VersionStatus::Archived.to_string(),
                version.chapter_id.to_string(),
                version.difficulty,
                VersionStatus::Published.to_string(),
                version_id.to_string(),
            ],
        )?;
        tx.execute(
            "UPDATE versions SET status = ?1 WHERE id = ?2",
            params![VersionStatus::Published.to_string(), version_id.to_string()],
        )?;
        tx.commit()?;

        debug!("Published {} (archived {})", version_id, archived);
        Ok(ChapterVersion {
            status: VersionStatus::Published,
            ..version
        })
    }

    async fn delete_version(&self, version_id: Uuid) -> Result<()> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM versions WHERE id = ?1",
            params![version_id.to_string()],
        )?;
        if deleted == 0 {
            return Err(ReadLevelError::NotFound(format!("Version {} not found", version_id)));
        }
        Ok(())
    }

    async fn insert_material(&self, material: &ListeningMaterial) -> Result<()> {
        let conn = self.conn()?;
        match insert_material_row(&conn, material) {
            Err(ReadLevelError::Database(e)) if is_unique_violation(&e) => Err(ReadLevelError::Conflict(
                format!("Material {} already exists", material.id),
            )),
            other => other.map(|_| ()),
        }
    }

    #[instrument(skip(self, matched), fields(source = %matched.audio_source))]
    async fn set_audio(&self, material_id: Uuid, matched: &AudioMatch) -> Result<ListeningMaterial> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        let updated = tx.execute(
            "UPDATE materials SET audio_url = ?1, audio_source = ?2, match_confidence = ?3, updated_at = ?4 \
             WHERE id = ?5",
            params![
                matched.audio_url,
                matched.audio_source.to_string(),
                matched.confidence.map(f64::from),
                Utc::now().to_rfc3339(),
                material_id.to_string(),
            ],
        )?;
        if updated == 0 {
            return Err(ReadLevelError::NotFound(format!("Material {} not found", material_id)));
        }

        let material = Self::load_material(&tx, material_id)?
            .ok_or_else(|| ReadLevelError::NotFound(format!("Material {} not found", material_id)))?;
        tx.commit()?;
        Ok(material)
    }

    async fn get_material(&self, material_id: Uuid) -> Result<Option<ListeningMaterial>> {
        let conn = self.conn()?;
        Self::load_material(&conn, material_id)
    }

    async fn find_material_by_title(&self, title: &str) -> Result<Option<ListeningMaterial>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                &format!("SELECT {} FROM materials WHERE title = ?1 LIMIT 1", MATERIAL_COLUMNS),
                params![title],
                material_from_row,
            )
            .optional()?)
    }

    async fn list_materials(&self) -> Result<Vec<ListeningMaterial>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {} FROM materials ORDER BY title", MATERIAL_COLUMNS))?;
        let materials = stmt
            .query_map([], material_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(materials)
    }

    #[instrument(skip(self, record), fields(material = %record.material_id))]
    async fn apply_review(&self, record: &ReviewRecord) -> Result<ListeningMaterial> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        let updated = tx.execute(
            "UPDATE materials SET review_status = ?1, updated_at = ?2 \
             WHERE id = ?3 AND review_status = ?4",
            params![
                record.status.to_string(),
                Utc::now().to_rfc3339(),
                record.material_id.to_string(),
                ReviewStatus::Pending.to_string(),
            ],
        )?;

        if updated == 0 {
            return match Self::load_material(&tx, record.material_id)? {
                Some(material) => Err(ReadLevelError::Conflict(format!(
                    "Material {} is already {}",
                    record.material_id, material.review_status
                ))),
                None => Err(ReadLevelError::NotFound(format!(
                    "Material {} not found",
                    record.material_id
                ))),
            };
        }

        tx.execute(
            "INSERT INTO reviews (id, material_id, status, rating, feedback, reviewer, reviewed_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.id.to_string(),
                record.material_id.to_string(),
                record.status.to_string(),
                record.rating,
                record.feedback,
                record.reviewer,
                record.reviewed_at.to_rfc3339(),
            ],
        )?;

        let material = Self::load_material(&tx, record.material_id)?
            .ok_or_else(|| ReadLevelError::NotFound(format!("Material {} not found", record.material_id)))?;
        tx.commit()?;
        Ok(material)
    }

    async fn reset_review(&self, material_id: Uuid) -> Result<ListeningMaterial> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE materials SET review_status = ?1, updated_at = ?2 WHERE id = ?3",
            params![
                ReviewStatus::Pending.to_string(),
                Utc::now().to_rfc3339(),
                material_id.to_string(),
            ],
        )?;
        Self::load_material(&conn, material_id)?
            .ok_or_else(|| ReadLevelError::NotFound(format!("Material {} not found", material_id)))
    }

    async fn list_reviews(&self, material_id: Uuid) -> Result<Vec<ReviewRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, material_id, status, rating, feedback, reviewer, reviewed_at \
             FROM reviews WHERE material_id = ?1 ORDER BY reviewed_at, rowid",
        )?;
        let reviews = stmt
            .query_map(params![material_id.to_string()], review_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(reviews)
    }
}
