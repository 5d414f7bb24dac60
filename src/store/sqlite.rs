//! SQLite-based metadata store.
//!
//! Holds resources, chunk rows and notes behind natural keys. `updated_at`
//! columns are maintained database-side by AFTER UPDATE triggers, so every
//! mutation path advances them without cooperation from callers.

use super::{
    AiFields, ChunkAiStatus, ChunkIndexEntry, ChunkRecord, ContentKind, NewChunk, NoteRecord,
    NoteSummary, Resource, ResourceFilter,
};
use crate::error::{NotatError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;
use tracing::{debug, info, instrument};

/// Maximum summary prefix length returned by the polling view.
const AI_STATUS_PREVIEW_CHARS: usize = 80;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS resources (
    id TEXT PRIMARY KEY,
    kind TEXT NOT NULL CHECK (kind IN ('video', 'book')),
    title TEXT NOT NULL,
    creator TEXT,
    publisher TEXT,
    year INTEGER,
    isbn TEXT,
    description TEXT,
    duration TEXT,
    tags TEXT NOT NULL DEFAULT '[]',
    published_at TEXT,
    thumbnails TEXT,
    localized TEXT,
    view_count INTEGER,
    like_count INTEGER,
    comment_count INTEGER,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_resources_kind ON resources(kind);
CREATE INDEX IF NOT EXISTS idx_resources_creator ON resources(creator);

CREATE TABLE IF NOT EXISTS chunks (
    resource_id TEXT NOT NULL,
    chunk_id INTEGER NOT NULL,
    text_ref TEXT NOT NULL,
    short_title TEXT,
    summary TEXT,
    key_points TEXT,
    key_topics TEXT,
    word_count INTEGER NOT NULL DEFAULT 0,
    sentence_count INTEGER NOT NULL DEFAULT 0,
    note_content TEXT,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (resource_id, chunk_id),
    FOREIGN KEY (resource_id) REFERENCES resources(id) ON DELETE CASCADE
);

-- Notes deliberately carry no foreign key: they outlive their resource.
CREATE TABLE IF NOT EXISTS notes (
    resource_id TEXT PRIMARY KEY,
    note_content TEXT NOT NULL,
    custom_tags TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TRIGGER IF NOT EXISTS resources_touch_updated AFTER UPDATE ON resources
BEGIN
    UPDATE resources SET updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
    WHERE id = NEW.id;
END;

CREATE TRIGGER IF NOT EXISTS chunks_touch_updated AFTER UPDATE ON chunks
BEGIN
    UPDATE chunks SET updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
    WHERE resource_id = NEW.resource_id AND chunk_id = NEW.chunk_id;
END;

CREATE TRIGGER IF NOT EXISTS notes_touch_updated AFTER UPDATE ON notes
BEGIN
    UPDATE notes SET updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
    WHERE resource_id = NEW.resource_id;
END;
"#;

/// SQLite-backed metadata store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;

        info!("Initialized metadata store at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| NotatError::Conflict(format!("Failed to acquire store lock: {}", e)))
    }

    // === Resources ===

    #[instrument(skip(self, resource), fields(id = %resource.id))]
    pub fn upsert_resource(&self, resource: &Resource) -> Result<()> {
        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();

        conn.execute(
            r#"
            INSERT INTO resources
            (id, kind, title, creator, publisher, year, isbn, description, duration,
             tags, published_at, thumbnails, localized, view_count, like_count,
             comment_count, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?17)
            ON CONFLICT(id) DO UPDATE SET
                kind = excluded.kind,
                title = excluded.title,
                creator = excluded.creator,
                publisher = excluded.publisher,
                year = excluded.year,
                isbn = excluded.isbn,
                description = excluded.description,
                duration = excluded.duration,
                tags = excluded.tags,
                published_at = excluded.published_at,
                thumbnails = excluded.thumbnails,
                localized = excluded.localized,
                view_count = excluded.view_count,
                like_count = excluded.like_count,
                comment_count = excluded.comment_count
            "#,
            params![
                resource.id,
                resource.kind.as_str(),
                resource.title,
                resource.creator,
                resource.publisher,
                resource.year,
                resource.isbn,
                resource.description,
                resource.duration,
                serde_json::to_string(&resource.tags)?,
                resource.published_at.map(|dt| dt.to_rfc3339()),
                resource
                    .thumbnails
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                resource
                    .localized
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                resource.view_count,
                resource.like_count,
                resource.comment_count,
                now,
            ],
        )?;

        debug!("Upserted resource {}", resource.id);
        Ok(())
    }

    pub fn get_resource(&self, id: &str) -> Result<Option<Resource>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, kind, title, creator, publisher, year, isbn, description, duration,
                    tags, published_at, thumbnails, localized, view_count, like_count,
                    comment_count, created_at, updated_at
             FROM resources WHERE id = ?1",
        )?;

        let mut rows = stmt.query_map(params![id], row_to_resource)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    pub fn list_resources(&self, filter: &ResourceFilter) -> Result<Vec<Resource>> {
        let conn = self.lock()?;

        let mut sql = String::from(
            "SELECT id, kind, title, creator, publisher, year, isbn, description, duration,
                    tags, published_at, thumbnails, localized, view_count, like_count,
                    comment_count, created_at, updated_at
             FROM resources",
        );
        let mut conditions = Vec::new();
        let mut values: Vec<rusqlite::types::Value> = Vec::new();

        if let Some(kind) = filter.kind {
            values.push(kind.as_str().to_string().into());
            conditions.push(format!("kind = ?{}", values.len()));
        }
        if let Some(creator) = &filter.creator {
            values.push(creator.clone().into());
            conditions.push(format!("creator = ?{}", values.len()));
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY created_at DESC");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(values), row_to_resource)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    pub fn list_resources_by_channel(&self, channel: &str) -> Result<Vec<Resource>> {
        self.list_resources(&ResourceFilter {
            kind: None,
            creator: Some(channel.to_string()),
            limit: None,
        })
    }

    /// Delete a resource. Chunk rows cascade; the resource's note survives.
    #[instrument(skip(self))]
    pub fn delete_resource(&self, id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let affected = conn.execute("DELETE FROM resources WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }

    // === Chunks ===

    /// Upsert a batch of chunk rows in ascending `chunk_id` order within one
    /// transaction. Existing AI fields and chunk notes at the same id are
    /// preserved; only text reference and size metrics are replaced.
    #[instrument(skip(self, chunks), fields(resource_id = %resource_id, count = chunks.len()))]
    pub fn upsert_chunk_batch(&self, resource_id: &str, chunks: &[NewChunk]) -> Result<usize> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;
        let now = Utc::now().to_rfc3339();

        let mut ordered: Vec<&NewChunk> = chunks.iter().collect();
        ordered.sort_by_key(|c| c.chunk_id);

        for chunk in &ordered {
            tx.execute(
                r#"
                INSERT INTO chunks
                (resource_id, chunk_id, text_ref, word_count, sentence_count, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(resource_id, chunk_id) DO UPDATE SET
                    text_ref = excluded.text_ref,
                    word_count = excluded.word_count,
                    sentence_count = excluded.sentence_count
                "#,
                params![
                    resource_id,
                    chunk.chunk_id,
                    chunk.text_ref,
                    chunk.word_count,
                    chunk.sentence_count,
                    now,
                ],
            )?;
        }

        tx.commit()?;
        info!("Upserted {} chunk rows for {}", ordered.len(), resource_id);
        Ok(ordered.len())
    }

    pub fn delete_chunks_for_resource(&self, resource_id: &str) -> Result<usize> {
        let conn = self.lock()?;
        let affected = conn.execute(
            "DELETE FROM chunks WHERE resource_id = ?1",
            params![resource_id],
        )?;
        Ok(affected)
    }

    pub fn get_chunks(&self, resource_id: &str) -> Result<Vec<ChunkRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT resource_id, chunk_id, text_ref, short_title, summary, key_points,
                    key_topics, word_count, sentence_count, note_content, updated_at
             FROM chunks WHERE resource_id = ?1 ORDER BY chunk_id",
        )?;
        let rows = stmt.query_map(params![resource_id], row_to_chunk)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    pub fn get_chunk(&self, resource_id: &str, chunk_id: i64) -> Result<Option<ChunkRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT resource_id, chunk_id, text_ref, short_title, summary, key_points,
                    key_topics, word_count, sentence_count, note_content, updated_at
             FROM chunks WHERE resource_id = ?1 AND chunk_id = ?2",
        )?;
        let mut rows = stmt.query_map(params![resource_id, chunk_id], row_to_chunk)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    pub fn count_chunks(&self, resource_id: &str) -> Result<i64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM chunks WHERE resource_id = ?1",
            params![resource_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Write enrichment fields for a chunk. Only non-empty fields are
    /// written; a field never transitions back to empty.
    pub fn update_chunk_ai_fields(
        &self,
        resource_id: &str,
        chunk_id: i64,
        fields: &AiFields,
    ) -> Result<bool> {
        let fields = fields.clone().normalized();
        if fields.is_empty() {
            return Ok(false);
        }

        let conn = self.lock()?;
        let affected = conn.execute(
            r#"
            UPDATE chunks SET
                short_title = COALESCE(?3, short_title),
                summary = COALESCE(?4, summary),
                key_points = COALESCE(?5, key_points),
                key_topics = COALESCE(?6, key_topics)
            WHERE resource_id = ?1 AND chunk_id = ?2
            "#,
            params![
                resource_id,
                chunk_id,
                fields.short_title,
                fields.summary,
                fields.key_points,
                fields.key_topics,
            ],
        )?;
        Ok(affected > 0)
    }

    /// Set a chunk's title (book chapter rename).
    pub fn set_chunk_title(&self, resource_id: &str, chunk_id: i64, title: &str) -> Result<bool> {
        let conn = self.lock()?;
        let affected = conn.execute(
            "UPDATE chunks SET short_title = ?3 WHERE resource_id = ?1 AND chunk_id = ?2",
            params![resource_id, chunk_id, title],
        )?;
        Ok(affected > 0)
    }

    /// Replace a chunk's text reference and size metrics.
    pub fn update_chunk_text(
        &self,
        resource_id: &str,
        chunk_id: i64,
        text_ref: &str,
        word_count: i64,
        sentence_count: i64,
    ) -> Result<bool> {
        let conn = self.lock()?;
        let affected = conn.execute(
            "UPDATE chunks SET text_ref = ?3, word_count = ?4, sentence_count = ?5
             WHERE resource_id = ?1 AND chunk_id = ?2",
            params![resource_id, chunk_id, text_ref, word_count, sentence_count],
        )?;
        Ok(affected > 0)
    }

    /// Set a chunk's user note. Unlike AI fields, notes may be overwritten
    /// with anything, including empty content.
    pub fn update_chunk_note(
        &self,
        resource_id: &str,
        chunk_id: i64,
        note_content: &str,
    ) -> Result<bool> {
        let conn = self.lock()?;
        let affected = conn.execute(
            "UPDATE chunks SET note_content = ?3 WHERE resource_id = ?1 AND chunk_id = ?2",
            params![resource_id, chunk_id, note_content],
        )?;
        Ok(affected > 0)
    }

    pub fn get_chunks_index(&self, resource_id: &str) -> Result<Vec<ChunkIndexEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT chunk_id, short_title, updated_at
             FROM chunks WHERE resource_id = ?1 ORDER BY chunk_id",
        )?;
        let rows = stmt.query_map(params![resource_id], |row| {
            Ok(ChunkIndexEntry {
                chunk_id: row.get(0)?,
                short_title: row.get(1)?,
                updated_at: parse_ts(row, 2)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Minimal enrichment status for polling: title plus presence and a
    /// short prefix of the summary, never the full text.
    pub fn get_chunks_ai_status(
        &self,
        resource_id: &str,
        chunk_id: Option<i64>,
    ) -> Result<Vec<ChunkAiStatus>> {
        let conn = self.lock()?;
        let sql = "SELECT chunk_id, short_title, summary
                   FROM chunks WHERE resource_id = ?1";

        let map = |row: &Row<'_>| {
            let summary: Option<String> = row.get(2)?;
            let summary_present = summary.as_deref().is_some_and(|s| !s.is_empty());
            Ok(ChunkAiStatus {
                chunk_id: row.get(0)?,
                short_title: row.get(1)?,
                summary_present,
                summary_preview: summary.filter(|s| !s.is_empty()).map(|s| {
                    s.chars().take(AI_STATUS_PREVIEW_CHARS).collect::<String>()
                }),
            })
        };

        let rows = match chunk_id {
            Some(id) => {
                let mut stmt = conn.prepare(&format!("{} AND chunk_id = ?2", sql))?;
                let rows = stmt.query_map(params![resource_id, id], map)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!("{} ORDER BY chunk_id", sql))?;
                let rows = stmt.query_map(params![resource_id], map)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(rows)
    }

    // === Notes ===

    /// Upsert a resource-level note. `custom_tags` of `None` preserves the
    /// existing tags on update.
    #[instrument(skip(self, note_content, custom_tags), fields(resource_id = %resource_id))]
    pub fn upsert_note(
        &self,
        resource_id: &str,
        note_content: &str,
        custom_tags: Option<&[String]>,
    ) -> Result<()> {
        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();
        let tags_json = custom_tags.map(serde_json::to_string).transpose()?;

        conn.execute(
            r#"
            INSERT INTO notes (resource_id, note_content, custom_tags, created_at, updated_at)
            VALUES (?1, ?2, COALESCE(?3, '[]'), ?4, ?4)
            ON CONFLICT(resource_id) DO UPDATE SET
                note_content = excluded.note_content,
                custom_tags = COALESCE(?3, notes.custom_tags)
            "#,
            params![resource_id, note_content, tags_json, now],
        )?;
        Ok(())
    }

    pub fn get_note(&self, resource_id: &str) -> Result<Option<NoteRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT resource_id, note_content, custom_tags, created_at, updated_at
             FROM notes WHERE resource_id = ?1",
        )?;
        let mut rows = stmt.query_map(params![resource_id], |row| {
            Ok(NoteRecord {
                resource_id: row.get(0)?,
                note_content: row.get(1)?,
                custom_tags: parse_tags(row, 2)?,
                created_at: parse_ts(row, 3)?,
                updated_at: parse_ts(row, 4)?,
            })
        })?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// List notes, newest first. With a channel filter only notes whose
    /// resource still exists and matches the creator are returned; without
    /// one, orphaned notes are included.
    pub fn list_notes(
        &self,
        limit: Option<usize>,
        channel: Option<&str>,
    ) -> Result<Vec<NoteSummary>> {
        let conn = self.lock()?;

        let mut sql = String::from(
            "SELECT n.resource_id, n.note_content, n.custom_tags, n.updated_at,
                    r.title, r.creator
             FROM notes n LEFT JOIN resources r ON r.id = n.resource_id",
        );
        let mut values: Vec<rusqlite::types::Value> = Vec::new();
        if let Some(channel) = channel {
            values.push(channel.to_string().into());
            sql.push_str(" WHERE r.creator = ?1");
        }
        sql.push_str(" ORDER BY n.updated_at DESC");
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(values), |row| {
            Ok(NoteSummary {
                resource_id: row.get(0)?,
                note_content: row.get(1)?,
                custom_tags: parse_tags(row, 2)?,
                updated_at: parse_ts(row, 3)?,
                title: row.get(4)?,
                creator: row.get(5)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }
}

// === Row mapping helpers ===

fn parse_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

fn parse_opt_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let text: Option<String> = row.get(idx)?;
    match text {
        None => Ok(None),
        Some(text) => DateTime::parse_from_rfc3339(&text)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    idx,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            }),
    }
}

fn parse_tags(row: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<String>> {
    let text: String = row.get(idx)?;
    Ok(serde_json::from_str(&text).unwrap_or_default())
}

fn parse_opt_json(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<serde_json::Value>> {
    let text: Option<String> = row.get(idx)?;
    Ok(text.and_then(|t| serde_json::from_str(&t).ok()))
}

fn row_to_resource(row: &Row<'_>) -> rusqlite::Result<Resource> {
    let kind_text: String = row.get(1)?;
    let kind = ContentKind::from_str(&kind_text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            e.into(),
        )
    })?;

    Ok(Resource {
        id: row.get(0)?,
        kind,
        title: row.get(2)?,
        creator: row.get(3)?,
        publisher: row.get(4)?,
        year: row.get(5)?,
        isbn: row.get(6)?,
        description: row.get(7)?,
        duration: row.get(8)?,
        tags: parse_tags(row, 9)?,
        published_at: parse_opt_ts(row, 10)?,
        thumbnails: parse_opt_json(row, 11)?,
        localized: parse_opt_json(row, 12)?,
        view_count: row.get(13)?,
        like_count: row.get(14)?,
        comment_count: row.get(15)?,
        created_at: parse_ts(row, 16)?,
        updated_at: parse_ts(row, 17)?,
    })
}

fn row_to_chunk(row: &Row<'_>) -> rusqlite::Result<ChunkRecord> {
    Ok(ChunkRecord {
        resource_id: row.get(0)?,
        chunk_id: row.get(1)?,
        text_ref: row.get(2)?,
        ai: AiFields {
            short_title: row.get(3)?,
            summary: row.get(4)?,
            key_points: row.get(5)?,
            key_topics: row.get(6)?,
        },
        word_count: row.get(7)?,
        sentence_count: row.get(8)?,
        note_content: row.get(9)?,
        updated_at: parse_ts(row, 10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::chunk_text_key;

    fn video(id: &str) -> Resource {
        let mut r = Resource::new(id.to_string(), ContentKind::Video, format!("Video {}", id));
        r.creator = Some("Test Channel".to_string());
        r
    }

    fn new_chunks(resource_id: &str, n: i64) -> Vec<NewChunk> {
        (1..=n)
            .map(|i| NewChunk {
                chunk_id: i,
                text_ref: chunk_text_key(resource_id, i),
                word_count: 100 * i,
                sentence_count: 10 * i,
            })
            .collect()
    }

    #[test]
    fn test_resource_roundtrip() {
        let store = SqliteStore::in_memory().unwrap();
        let mut resource = video("abc123def45");
        resource.tags = vec!["rust".to_string(), "testing".to_string()];
        resource.view_count = Some(42_000);
        resource.thumbnails = Some(serde_json::json!({"default": {"url": "http://x/y.jpg"}}));

        store.upsert_resource(&resource).unwrap();
        let loaded = store.get_resource("abc123def45").unwrap().unwrap();

        assert_eq!(loaded.kind, ContentKind::Video);
        assert_eq!(loaded.title, "Video abc123def45");
        assert_eq!(loaded.tags, vec!["rust", "testing"]);
        assert_eq!(loaded.view_count, Some(42_000));
        assert!(loaded.thumbnails.is_some());
        assert!(store.get_resource("missing").unwrap().is_none());
    }

    #[test]
    fn test_upsert_advances_updated_at() {
        let store = SqliteStore::in_memory().unwrap();
        let resource = video("abc123def45");
        store.upsert_resource(&resource).unwrap();
        let first = store.get_resource("abc123def45").unwrap().unwrap();

        std::thread::sleep(std::time::Duration::from_millis(5));

        let mut changed = resource.clone();
        changed.title = "Renamed".to_string();
        store.upsert_resource(&changed).unwrap();
        let second = store.get_resource("abc123def45").unwrap().unwrap();

        assert_eq!(second.title, "Renamed");
        assert!(second.updated_at > first.updated_at);
        assert_eq!(second.created_at, first.created_at);
    }

    #[test]
    fn test_chunk_batch_and_dense_ids() {
        let store = SqliteStore::in_memory().unwrap();
        store.upsert_resource(&video("abc123def45")).unwrap();
        store
            .upsert_chunk_batch("abc123def45", &new_chunks("abc123def45", 5))
            .unwrap();

        let chunks = store.get_chunks("abc123def45").unwrap();
        assert_eq!(chunks.len(), 5);
        let ids: Vec<i64> = chunks.iter().map(|c| c.chunk_id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_chunk_upsert_preserves_ai_fields() {
        let store = SqliteStore::in_memory().unwrap();
        store.upsert_resource(&video("abc123def45")).unwrap();
        store
            .upsert_chunk_batch("abc123def45", &new_chunks("abc123def45", 2))
            .unwrap();

        let fields = AiFields {
            short_title: Some("A title".to_string()),
            summary: Some("A summary".to_string()),
            ..Default::default()
        };
        assert!(store
            .update_chunk_ai_fields("abc123def45", 1, &fields)
            .unwrap());

        // Re-upsert the same ids with new refs/metrics
        store
            .upsert_chunk_batch("abc123def45", &new_chunks("abc123def45", 2))
            .unwrap();

        let chunk = store.get_chunk("abc123def45", 1).unwrap().unwrap();
        assert_eq!(chunk.ai.short_title.as_deref(), Some("A title"));
        assert_eq!(chunk.ai.summary.as_deref(), Some("A summary"));
    }

    #[test]
    fn test_ai_fields_never_cleared() {
        let store = SqliteStore::in_memory().unwrap();
        store.upsert_resource(&video("abc123def45")).unwrap();
        store
            .upsert_chunk_batch("abc123def45", &new_chunks("abc123def45", 1))
            .unwrap();

        store
            .update_chunk_ai_fields(
                "abc123def45",
                1,
                &AiFields {
                    summary: Some("original".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();

        // An empty write never clears
        store
            .update_chunk_ai_fields(
                "abc123def45",
                1,
                &AiFields {
                    summary: Some(String::new()),
                    short_title: Some("fresh title".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();

        let chunk = store.get_chunk("abc123def45", 1).unwrap().unwrap();
        assert_eq!(chunk.ai.summary.as_deref(), Some("original"));
        assert_eq!(chunk.ai.short_title.as_deref(), Some("fresh title"));

        // A non-empty write overwrites
        store
            .update_chunk_ai_fields(
                "abc123def45",
                1,
                &AiFields {
                    summary: Some("replaced".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        let chunk = store.get_chunk("abc123def45", 1).unwrap().unwrap();
        assert_eq!(chunk.ai.summary.as_deref(), Some("replaced"));
    }

    #[test]
    fn test_chunk_note_survives_enrichment() {
        let store = SqliteStore::in_memory().unwrap();
        store.upsert_resource(&video("abc123def45")).unwrap();
        store
            .upsert_chunk_batch("abc123def45", &new_chunks("abc123def45", 1))
            .unwrap();

        store
            .update_chunk_note("abc123def45", 1, "# my note")
            .unwrap();
        store
            .update_chunk_ai_fields(
                "abc123def45",
                1,
                &AiFields {
                    summary: Some("summary".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();

        let chunk = store.get_chunk("abc123def45", 1).unwrap().unwrap();
        assert_eq!(chunk.note_content.as_deref(), Some("# my note"));
    }

    #[test]
    fn test_cascade_delete_keeps_note() {
        let store = SqliteStore::in_memory().unwrap();
        store.upsert_resource(&video("abc123def45")).unwrap();
        store
            .upsert_chunk_batch("abc123def45", &new_chunks("abc123def45", 3))
            .unwrap();
        store
            .upsert_note("abc123def45", "# resource note", None)
            .unwrap();

        assert!(store.delete_resource("abc123def45").unwrap());

        assert!(store.get_resource("abc123def45").unwrap().is_none());
        assert!(store.get_chunks("abc123def45").unwrap().is_empty());
        // The note row is orphaned, not deleted
        let note = store.get_note("abc123def45").unwrap().unwrap();
        assert_eq!(note.note_content, "# resource note");
    }

    #[test]
    fn test_ai_status_preview_truncated() {
        let store = SqliteStore::in_memory().unwrap();
        store.upsert_resource(&video("abc123def45")).unwrap();
        store
            .upsert_chunk_batch("abc123def45", &new_chunks("abc123def45", 2))
            .unwrap();

        let long_summary = "x".repeat(500);
        store
            .update_chunk_ai_fields(
                "abc123def45",
                1,
                &AiFields {
                    summary: Some(long_summary),
                    ..Default::default()
                },
            )
            .unwrap();

        let status = store.get_chunks_ai_status("abc123def45", None).unwrap();
        assert_eq!(status.len(), 2);
        assert!(status[0].summary_present);
        assert_eq!(status[0].summary_preview.as_ref().unwrap().len(), 80);
        assert!(!status[1].summary_present);
        assert!(status[1].summary_preview.is_none());

        let single = store.get_chunks_ai_status("abc123def45", Some(2)).unwrap();
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].chunk_id, 2);
    }

    #[test]
    fn test_notes_listing_and_channel_filter() {
        let store = SqliteStore::in_memory().unwrap();
        let mut a = video("aaaaaaaaaaa");
        a.creator = Some("Channel A".to_string());
        store.upsert_resource(&a).unwrap();
        store.upsert_note("aaaaaaaaaaa", "note a", None).unwrap();
        // Orphan note (no resource row)
        store.upsert_note("ghost_book", "orphan", None).unwrap();

        let all = store.list_notes(None, None).unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().any(|n| n.title.is_none()));

        let filtered = store.list_notes(None, Some("Channel A")).unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].resource_id, "aaaaaaaaaaa");

        let limited = store.list_notes(Some(1), None).unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_note_tags_preserved_when_omitted() {
        let store = SqliteStore::in_memory().unwrap();
        let tags = vec!["philosophy".to_string()];
        store.upsert_note("some_book", "v1", Some(&tags)).unwrap();
        store.upsert_note("some_book", "v2", None).unwrap();

        let note = store.get_note("some_book").unwrap().unwrap();
        assert_eq!(note.note_content, "v2");
        assert_eq!(note.custom_tags, vec!["philosophy"]);
    }

    #[test]
    fn test_list_resources_filtering() {
        let store = SqliteStore::in_memory().unwrap();
        store.upsert_resource(&video("aaaaaaaaaaa")).unwrap();
        let book = Resource::new("my_book".to_string(), ContentKind::Book, "A Book".to_string());
        store.upsert_resource(&book).unwrap();

        let books = store
            .list_resources(&ResourceFilter {
                kind: Some(ContentKind::Book),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].id, "my_book");

        let by_channel = store.list_resources_by_channel("Test Channel").unwrap();
        assert_eq!(by_channel.len(), 1);
        assert_eq!(by_channel[0].id, "aaaaaaaaaaa");
    }

    #[test]
    fn test_chunk_title_and_text_update() {
        let store = SqliteStore::in_memory().unwrap();
        store.upsert_resource(&video("abc123def45")).unwrap();
        store
            .upsert_chunk_batch("abc123def45", &new_chunks("abc123def45", 1))
            .unwrap();

        assert!(store
            .set_chunk_title("abc123def45", 1, "Chapter One")
            .unwrap());
        assert!(store
            .update_chunk_text("abc123def45", 1, "abc123def45/1.txt", 250, 12)
            .unwrap());

        let chunk = store.get_chunk("abc123def45", 1).unwrap().unwrap();
        assert_eq!(chunk.ai.short_title.as_deref(), Some("Chapter One"));
        assert_eq!(chunk.word_count, 250);
        assert_eq!(chunk.sentence_count, 12);

        assert!(!store.set_chunk_title("abc123def45", 99, "missing").unwrap());
    }

    #[test]
    fn test_chunks_index() {
        let store = SqliteStore::in_memory().unwrap();
        store.upsert_resource(&video("abc123def45")).unwrap();
        store
            .upsert_chunk_batch("abc123def45", &new_chunks("abc123def45", 3))
            .unwrap();
        store
            .set_chunk_title("abc123def45", 2, "Named")
            .unwrap();

        let index = store.get_chunks_index("abc123def45").unwrap();
        assert_eq!(index.len(), 3);
        assert_eq!(index[1].chunk_id, 2);
        assert_eq!(index[1].short_title.as_deref(), Some("Named"));
        assert!(index[0].short_title.is_none());
    }
}
