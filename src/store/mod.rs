//! Persistence layer for Notat.
//!
//! Two stores back the pipeline: a relational metadata store (SQLite) for
//! resources, chunks and notes, and an object store holding the raw chunk
//! text payloads keyed by `<resource_id>/<chunk_id>.txt`.

mod object;
mod sqlite;

pub use object::FsObjectStore;
pub use sqlite::SqliteStore;

use crate::error::{NotatError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of ingested resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Video,
    Book,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Video => "video",
            ContentKind::Book => "book",
        }
    }
}

impl std::str::FromStr for ContentKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "video" => Ok(ContentKind::Video),
            "book" => Ok(ContentKind::Book),
            _ => Err(format!("Unknown content kind: {}", s)),
        }
    }
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A top-level ingestion unit: a video or a book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    /// Video ID (11 characters) or normalized book slug.
    pub id: String,
    pub kind: ContentKind,
    pub title: String,
    /// Uploading channel (videos) or author (books).
    pub creator: Option<String>,
    pub publisher: Option<String>,
    pub year: Option<i64>,
    pub isbn: Option<String>,
    pub description: Option<String>,
    /// ISO-8601 duration string as reported by the source (videos).
    pub duration: Option<String>,
    pub tags: Vec<String>,
    pub published_at: Option<DateTime<Utc>>,
    /// Opaque thumbnail JSON from the source.
    pub thumbnails: Option<serde_json::Value>,
    /// Localized title/description blob; only kept when the source's default
    /// language is not English.
    pub localized: Option<serde_json::Value>,
    pub view_count: Option<i64>,
    pub like_count: Option<i64>,
    pub comment_count: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Resource {
    /// A bare resource with only identity and title set.
    pub fn new(id: String, kind: ContentKind, title: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            kind,
            title,
            creator: None,
            publisher: None,
            year: None,
            isbn: None,
            description: None,
            duration: None,
            tags: Vec::new(),
            published_at: None,
            thumbnails: None,
            localized: None,
            view_count: None,
            like_count: None,
            comment_count: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// The four LLM-produced enrichment fields of a chunk.
///
/// Empty strings are treated the same as absent values throughout: a write
/// only ever replaces a field with non-empty content.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AiFields {
    pub short_title: Option<String>,
    pub summary: Option<String>,
    pub key_points: Option<String>,
    pub key_topics: Option<String>,
}

impl AiFields {
    /// Normalize empty strings to `None`.
    pub fn normalized(mut self) -> Self {
        for field in [
            &mut self.short_title,
            &mut self.summary,
            &mut self.key_points,
            &mut self.key_topics,
        ] {
            if field.as_deref().is_some_and(|s| s.trim().is_empty()) {
                *field = None;
            }
        }
        self
    }

    /// True when all four fields carry content.
    pub fn is_complete(&self) -> bool {
        [
            &self.short_title,
            &self.summary,
            &self.key_points,
            &self.key_topics,
        ]
        .iter()
        .all(|f| f.as_deref().is_some_and(|s| !s.is_empty()))
    }

    /// True when no field carries content.
    pub fn is_empty(&self) -> bool {
        [
            &self.short_title,
            &self.summary,
            &self.key_points,
            &self.key_topics,
        ]
        .iter()
        .all(|f| f.is_none())
    }
}

/// A stored chunk row: lightweight metadata plus enrichment fields. The text
/// itself lives in the object store behind `text_ref`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub resource_id: String,
    pub chunk_id: i64,
    pub text_ref: String,
    pub word_count: i64,
    pub sentence_count: i64,
    #[serde(flatten)]
    pub ai: AiFields,
    pub note_content: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Input row for a chunk batch upsert.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub chunk_id: i64,
    pub text_ref: String,
    pub word_count: i64,
    pub sentence_count: i64,
}

/// Resource-level markdown note. Note rows are decoupled from resources and
/// survive resource deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteRecord {
    pub resource_id: String,
    pub note_content: String,
    pub custom_tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A note listing entry, joined with the owning resource when it still
/// exists (orphaned notes list with `title`/`creator` unset).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteSummary {
    pub resource_id: String,
    pub note_content: String,
    pub custom_tags: Vec<String>,
    pub updated_at: DateTime<Utc>,
    pub title: Option<String>,
    pub creator: Option<String>,
}

/// Lightweight chunk listing entry for client-side dropdowns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkIndexEntry {
    pub chunk_id: i64,
    pub short_title: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Minimal per-chunk enrichment status for polling clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkAiStatus {
    pub chunk_id: i64,
    pub short_title: Option<String>,
    pub summary_present: bool,
    /// At most the first 80 characters of the summary, never the full text.
    pub summary_preview: Option<String>,
}

/// Filter for resource listings.
#[derive(Debug, Clone, Default)]
pub struct ResourceFilter {
    pub kind: Option<ContentKind>,
    pub creator: Option<String>,
    pub limit: Option<usize>,
}

/// Normalize a user-supplied book identifier to the `[a-z0-9_]+` form:
/// lower-cased, with whitespace and hyphens mapped to underscores.
pub fn normalize_book_id(input: &str) -> Result<String> {
    let mut slug = String::with_capacity(input.len());
    for ch in input.trim().to_lowercase().chars() {
        match ch {
            'a'..='z' | '0'..='9' | '_' => slug.push(ch),
            ' ' | '-' | '\t' => slug.push('_'),
            _ => {
                return Err(NotatError::InvalidInput(format!(
                    "Invalid book id '{}': only letters, digits, underscores, spaces and hyphens are allowed",
                    input
                )))
            }
        }
    }
    if slug.is_empty() {
        return Err(NotatError::InvalidInput("Book id must not be empty".to_string()));
    }
    Ok(slug)
}

/// Object key for a chunk text payload.
pub fn chunk_text_key(resource_id: &str, chunk_id: i64) -> String {
    format!("{}/{}.txt", resource_id, chunk_id)
}

/// Trait for chunk-text object stores.
///
/// All writes are idempotent upserts; deleting something that does not exist
/// succeeds.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store a chunk text payload, returning its reference key.
    async fn put_text(&self, resource_id: &str, chunk_id: i64, text: &str) -> Result<String>;

    /// Fetch a payload by reference.
    async fn get_text(&self, text_ref: &str) -> Result<String>;

    /// Delete a single payload.
    async fn delete_text(&self, text_ref: &str) -> Result<()>;

    /// Delete every payload whose key is prefixed by the resource ID.
    async fn delete_all_for_resource(&self, resource_id: &str) -> Result<()>;
}
