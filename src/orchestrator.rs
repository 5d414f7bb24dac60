//! Pipeline orchestrator for Notat.
//!
//! Composes the metadata fetcher, subtitle extractor, chunker, enricher and
//! the two stores into the three pipeline stages (metadata, chunks,
//! enrichment) plus the combined full run, and carries the book-chapter
//! maintenance operations built from the same pieces.
//!
//! Mutating operations on one resource are serialized through a keyed lock,
//! so two concurrent runs for the same resource cannot interleave their
//! delete-then-recreate passes.

use crate::chunking::{text_metrics, ChunkingConfig, WordChunker};
use crate::config::{Prompts, Settings};
use crate::enrich::{Annotator, Enricher, OpenAiAnnotator};
use crate::error::{NotatError, Result};
use crate::store::{
    AiFields, ChunkRecord, ContentKind, FsObjectStore, NewChunk, ObjectStore, Resource,
    SqliteStore, normalize_book_id,
};
use crate::subtitles::{TranscriptSource, YtDlpSubtitles};
use crate::youtube::{parse_video_input, VideoMetadataSource, YoutubeClient};
use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Keyed mutual exclusion for per-resource pipeline operations.
///
/// Locks are handed out as `Arc`s and tracked weakly, so entries for idle
/// resources disappear instead of growing the map without bound.
#[derive(Default)]
pub struct ResourceLocks {
    inner: Mutex<HashMap<(ContentKind, String), Weak<tokio::sync::Mutex<()>>>>,
}

impl ResourceLocks {
    /// Get (or create) the lock for a resource.
    pub fn acquire(&self, kind: ContentKind, id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        map.retain(|_, weak| weak.strong_count() > 0);

        let key = (kind, id.to_string());
        if let Some(existing) = map.get(&key).and_then(Weak::upgrade) {
            return existing;
        }

        let lock = Arc::new(tokio::sync::Mutex::new(()));
        map.insert(key, Arc::downgrade(&lock));
        lock
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

/// Result of the chunking stage.
#[derive(Debug)]
pub struct ChunksOutcome {
    pub resource_id: String,
    pub chunk_count: usize,
}

/// Result of the enrichment stage.
#[derive(Debug)]
pub struct EnrichmentOutcome {
    pub resource_id: String,
    pub chunks_attempted: usize,
}

/// Result of a full pipeline run.
#[derive(Debug)]
pub struct FullOutcome {
    pub resource: Resource,
    pub chunk_count: usize,
    pub chunks_attempted: usize,
}

/// One chunk slot in a delete-then-recreate pass.
struct ChunkWrite {
    text: String,
    word_count: i64,
    sentence_count: i64,
    ai: AiFields,
    note: Option<String>,
}

/// The main orchestrator for the Notat pipeline.
pub struct Orchestrator {
    settings: Settings,
    prompts: Prompts,
    metadata_source: Arc<dyn VideoMetadataSource>,
    transcripts: Arc<dyn TranscriptSource>,
    enricher: Enricher,
    store: Arc<SqliteStore>,
    objects: Arc<dyn ObjectStore>,
    locks: ResourceLocks,
}

impl Orchestrator {
    /// Create a new orchestrator with default components.
    pub fn new(settings: Settings) -> Result<Self> {
        let prompts = Prompts::load(None)?;

        let metadata_source: Arc<dyn VideoMetadataSource> = Arc::new(YoutubeClient::new(
            settings.youtube.api_key.as_deref().unwrap_or_default(),
            Duration::from_secs(settings.youtube.timeout_seconds),
        )?);

        let transcripts: Arc<dyn TranscriptSource> = Arc::new(YtDlpSubtitles::new(
            &settings.temp_dir(),
            Duration::from_secs(settings.subtitles.timeout_seconds),
            settings.subtitles.filler_markers.clone(),
        ));

        let annotator: Arc<dyn Annotator> = Arc::new(OpenAiAnnotator::new(&settings.enrichment));
        let enricher = Enricher::new(annotator, settings.enrichment.max_workers);

        let store = Arc::new(SqliteStore::new(&settings.sqlite_path())?);
        let objects: Arc<dyn ObjectStore> = Arc::new(FsObjectStore::new(&settings.objects_dir())?);

        Ok(Self {
            settings,
            prompts,
            metadata_source,
            transcripts,
            enricher,
            store,
            objects,
            locks: ResourceLocks::default(),
        })
    }

    /// Create an orchestrator with custom components.
    pub fn with_components(
        settings: Settings,
        prompts: Prompts,
        metadata_source: Arc<dyn VideoMetadataSource>,
        transcripts: Arc<dyn TranscriptSource>,
        annotator: Arc<dyn Annotator>,
        store: Arc<SqliteStore>,
        objects: Arc<dyn ObjectStore>,
    ) -> Self {
        let enricher = Enricher::new(annotator, settings.enrichment.max_workers);
        Self {
            settings,
            prompts,
            metadata_source,
            transcripts,
            enricher,
            store,
            objects,
            locks: ResourceLocks::default(),
        }
    }

    pub fn store(&self) -> Arc<SqliteStore> {
        self.store.clone()
    }

    pub fn objects(&self) -> Arc<dyn ObjectStore> {
        self.objects.clone()
    }

    pub fn prompts(&self) -> &Prompts {
        &self.prompts
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    // === Pipeline stages ===

    /// Stage 1: resolve a URL or bare ID and persist video metadata. Never
    /// touches chunks.
    #[instrument(skip(self), fields(input = %input))]
    pub async fn process_metadata(&self, input: &str) -> Result<Resource> {
        let video_id = parse_video_input(input)?;

        info!("Fetching metadata for {}", video_id);
        let resource = self.metadata_source.fetch_video(&video_id).await?;
        self.store.upsert_resource(&resource)?;

        Ok(resource)
    }

    /// Stage 2: extract the transcript, chunk it, and replace the resource's
    /// chunk set. Reruns are idempotent: all prior chunks and payloads are
    /// purged before new ones are written. Enrichment fields and chunk notes
    /// are carried over by position where a chunk id survives.
    #[instrument(skip(self, cancel), fields(input = %input))]
    pub async fn process_chunks(
        &self,
        input: &str,
        cancel: &CancellationToken,
    ) -> Result<ChunksOutcome> {
        let video_id = parse_video_input(input)?;

        let resource = self
            .store
            .get_resource(&video_id)?
            .ok_or_else(|| NotatError::NotFound(format!("Resource not found: {}", video_id)))?;
        if resource.kind != ContentKind::Video {
            return Err(NotatError::Conflict(format!(
                "Resource {} is not a video",
                video_id
            )));
        }

        let lock = self.locks.acquire(ContentKind::Video, &video_id);
        let _guard = lock.lock().await;

        info!("Extracting transcript for {}", video_id);
        let transcript = self.transcripts.extract_transcript(&video_id).await?;

        let chunks = match &transcript {
            Some(text) => {
                let chunker = WordChunker::new(ChunkingConfig::from(&self.settings.chunking));
                chunker.chunk(text)
            }
            None => Vec::new(),
        };
        info!("Chunked {} into {} chunks", video_id, chunks.len());

        if cancel.is_cancelled() {
            return Err(NotatError::Cancelled);
        }

        // Carry enrichment and notes over by position
        let snapshot = self.snapshot_chunks(&video_id)?;

        let writes: Vec<ChunkWrite> = chunks
            .into_iter()
            .map(|c| {
                let prior = snapshot.get(&c.chunk_id);
                ChunkWrite {
                    text: c.text,
                    word_count: c.word_count,
                    sentence_count: c.sentence_count,
                    ai: prior.map(|p| p.ai.clone()).unwrap_or_default(),
                    note: prior.and_then(|p| p.note_content.clone()),
                }
            })
            .collect();

        let chunk_count = self.rewrite_chunks(&video_id, writes, cancel).await?;

        Ok(ChunksOutcome {
            resource_id: video_id,
            chunk_count,
        })
    }

    /// Stage 3: enrich every stored chunk of a resource. Bounded concurrency;
    /// a failure on one chunk leaves its fields empty and does not stop the
    /// others. With `force` unset, chunks whose four fields are already
    /// populated are skipped.
    #[instrument(skip(self, cancel, progress), fields(resource_id = %resource_id))]
    pub async fn process_enrichment(
        &self,
        resource_id: &str,
        force: bool,
        cancel: &CancellationToken,
        progress: Option<Arc<AtomicU64>>,
    ) -> Result<EnrichmentOutcome> {
        let resource = self
            .store
            .get_resource(resource_id)?
            .ok_or_else(|| NotatError::NotFound(format!("Resource not found: {}", resource_id)))?;

        let lock = self.locks.acquire(resource.kind, resource_id);
        let _guard = lock.lock().await;

        let chunks = self.store.get_chunks(resource_id)?;

        let mut inputs: Vec<(i64, String)> = Vec::new();
        for chunk in &chunks {
            if !force && chunk.ai.is_complete() {
                continue;
            }
            if cancel.is_cancelled() {
                return Err(NotatError::Cancelled);
            }
            match self.objects.get_text(&chunk.text_ref).await {
                Ok(text) => inputs.push((chunk.chunk_id, text)),
                // A missing payload is absorbed like a failed enrichment:
                // the chunk's fields stay empty
                Err(e) => warn!(
                    "Skipping chunk {} of {}: {}",
                    chunk.chunk_id, resource_id, e
                ),
            }
        }

        if inputs.is_empty() {
            return Ok(EnrichmentOutcome {
                resource_id: resource_id.to_string(),
                chunks_attempted: 0,
            });
        }

        let attempted = inputs.len();
        info!("Enriching {} chunks for {}", attempted, resource_id);

        let prompt_set = self.prompts.for_kind(resource.kind);
        let results = self
            .enricher
            .enrich_all(inputs, prompt_set, cancel, progress)
            .await;

        for result in results {
            if result.fields.is_empty() {
                continue;
            }
            self.store
                .update_chunk_ai_fields(resource_id, result.chunk_id, &result.fields)?;
        }

        Ok(EnrichmentOutcome {
            resource_id: resource_id.to_string(),
            chunks_attempted: attempted,
        })
    }

    /// All three stages in sequence. A failure in an earlier stage aborts
    /// the later ones; state persisted by completed stages remains.
    #[instrument(skip(self, cancel), fields(input = %input))]
    pub async fn process_full(
        &self,
        input: &str,
        cancel: &CancellationToken,
    ) -> Result<FullOutcome> {
        let resource = self.process_metadata(input).await?;
        let chunks = self.process_chunks(&resource.id, cancel).await?;
        let enrichment = self
            .process_enrichment(&resource.id, true, cancel, None)
            .await?;

        Ok(FullOutcome {
            resource,
            chunk_count: chunks.chunk_count,
            chunks_attempted: enrichment.chunks_attempted,
        })
    }

    /// Delete a resource with its chunks and payloads. The resource-level
    /// note is decoupled and survives.
    #[instrument(skip(self), fields(resource_id = %resource_id))]
    pub async fn delete_resource(&self, resource_id: &str) -> Result<bool> {
        let Some(resource) = self.store.get_resource(resource_id)? else {
            return Ok(false);
        };

        let lock = self.locks.acquire(resource.kind, resource_id);
        let _guard = lock.lock().await;

        self.objects.delete_all_for_resource(resource_id).await?;
        Ok(self.store.delete_resource(resource_id)?)
    }

    // === Books ===

    /// Create (or replace) a book and its chapters. The request's chapter
    /// list is the authoritative chunk sequence; prior chapters are purged
    /// first. Analytical fields and notes carry over by position, while
    /// chapter titles always come from the request.
    #[instrument(skip(self, book), fields(book_id = %book.book_id))]
    pub async fn create_book(&self, book: NewBook) -> Result<(Resource, usize)> {
        let book_id = normalize_book_id(&book.book_id)?;

        let lock = self.locks.acquire(ContentKind::Book, &book_id);
        let _guard = lock.lock().await;

        let mut resource = Resource::new(book_id.clone(), ContentKind::Book, book.title);
        resource.creator = book.author;
        resource.description = book.description;
        resource.publisher = book.publisher;
        resource.year = book.year;
        resource.isbn = book.isbn;
        self.store.upsert_resource(&resource)?;

        let snapshot = self.snapshot_chunks(&book_id)?;
        let writes: Vec<ChunkWrite> = book
            .chapters
            .into_iter()
            .enumerate()
            .map(|(i, chapter)| {
                let chunk_id = (i + 1) as i64;
                let (word_count, sentence_count) = text_metrics(&chapter.chapter_text);
                let prior = snapshot.get(&chunk_id);
                ChunkWrite {
                    text: chapter.chapter_text,
                    word_count,
                    sentence_count,
                    ai: AiFields {
                        short_title: Some(chapter.chapter_title),
                        summary: prior.and_then(|p| p.ai.summary.clone()),
                        key_points: prior.and_then(|p| p.ai.key_points.clone()),
                        key_topics: prior.and_then(|p| p.ai.key_topics.clone()),
                    },
                    note: prior.and_then(|p| p.note_content.clone()),
                }
            })
            .collect();

        let count = self
            .rewrite_chunks(&book_id, writes, &CancellationToken::new())
            .await?;

        let resource = self
            .store
            .get_resource(&book_id)?
            .ok_or_else(|| NotatError::NotFound(format!("Book not found: {}", book_id)))?;
        Ok((resource, count))
    }

    /// Rename a chapter.
    pub async fn rename_chapter(
        &self,
        book_id: &str,
        chapter_id: i64,
        title: &str,
    ) -> Result<()> {
        let book_id = self.require_book(book_id)?;
        let lock = self.locks.acquire(ContentKind::Book, &book_id);
        let _guard = lock.lock().await;

        if !self.store.set_chunk_title(&book_id, chapter_id, title)? {
            return Err(NotatError::NotFound(format!(
                "Chapter {} of {} not found",
                chapter_id, book_id
            )));
        }
        Ok(())
    }

    /// Replace a chapter's text: the stored payload is rewritten in place
    /// and the size metrics recomputed.
    #[instrument(skip(self, text), fields(book_id = %book_id, chapter_id = chapter_id))]
    pub async fn replace_chapter_text(
        &self,
        book_id: &str,
        chapter_id: i64,
        text: &str,
    ) -> Result<()> {
        let book_id = self.require_book(book_id)?;
        let lock = self.locks.acquire(ContentKind::Book, &book_id);
        let _guard = lock.lock().await;

        let chunk = self
            .store
            .get_chunk(&book_id, chapter_id)?
            .ok_or_else(|| {
                NotatError::NotFound(format!("Chapter {} of {} not found", chapter_id, book_id))
            })?;

        self.objects.delete_text(&chunk.text_ref).await?;
        let text_ref = self.objects.put_text(&book_id, chapter_id, text).await?;
        let (word_count, sentence_count) = text_metrics(text);
        self.store
            .update_chunk_text(&book_id, chapter_id, &text_ref, word_count, sentence_count)?;
        Ok(())
    }

    /// Reorder chapters. `order` must be a permutation of the existing
    /// chapter ids; the chapters are re-keyed to dense ids `1..N` preserving
    /// the requested order, payloads included.
    #[instrument(skip(self), fields(book_id = %book_id))]
    pub async fn reorder_chapters(&self, book_id: &str, order: &[i64]) -> Result<usize> {
        let book_id = self.require_book(book_id)?;
        let lock = self.locks.acquire(ContentKind::Book, &book_id);
        let _guard = lock.lock().await;

        let chunks = self.store.get_chunks(&book_id)?;

        let mut existing: Vec<i64> = chunks.iter().map(|c| c.chunk_id).collect();
        let mut requested: Vec<i64> = order.to_vec();
        existing.sort_unstable();
        requested.sort_unstable();
        if existing != requested {
            return Err(NotatError::InvalidInput(format!(
                "chapter_order must be a permutation of the existing chapter ids of {}",
                book_id
            )));
        }

        let by_id: HashMap<i64, &ChunkRecord> =
            chunks.iter().map(|c| (c.chunk_id, c)).collect();

        let mut writes = Vec::with_capacity(order.len());
        for old_id in order {
            let chunk = by_id[old_id];
            let text = self.objects.get_text(&chunk.text_ref).await?;
            writes.push(ChunkWrite {
                text,
                word_count: chunk.word_count,
                sentence_count: chunk.sentence_count,
                ai: chunk.ai.clone(),
                note: chunk.note_content.clone(),
            });
        }

        self.rewrite_chunks(&book_id, writes, &CancellationToken::new())
            .await
    }

    /// Delete a chapter and its payload, then densify the remaining ids.
    #[instrument(skip(self), fields(book_id = %book_id, chapter_id = chapter_id))]
    pub async fn delete_chapter(&self, book_id: &str, chapter_id: i64) -> Result<usize> {
        let book_id = self.require_book(book_id)?;
        let lock = self.locks.acquire(ContentKind::Book, &book_id);
        let _guard = lock.lock().await;

        let chunks = self.store.get_chunks(&book_id)?;
        if !chunks.iter().any(|c| c.chunk_id == chapter_id) {
            return Err(NotatError::NotFound(format!(
                "Chapter {} of {} not found",
                chapter_id, book_id
            )));
        }

        let mut writes = Vec::with_capacity(chunks.len().saturating_sub(1));
        for chunk in chunks.iter().filter(|c| c.chunk_id != chapter_id) {
            let text = self.objects.get_text(&chunk.text_ref).await?;
            writes.push(ChunkWrite {
                text,
                word_count: chunk.word_count,
                sentence_count: chunk.sentence_count,
                ai: chunk.ai.clone(),
                note: chunk.note_content.clone(),
            });
        }

        self.rewrite_chunks(&book_id, writes, &CancellationToken::new())
            .await
    }

    // === Internals ===

    fn require_book(&self, book_id: &str) -> Result<String> {
        let book_id = normalize_book_id(book_id)?;
        let resource = self
            .store
            .get_resource(&book_id)?
            .ok_or_else(|| NotatError::NotFound(format!("Book not found: {}", book_id)))?;
        if resource.kind != ContentKind::Book {
            return Err(NotatError::Conflict(format!(
                "Resource {} is not a book",
                book_id
            )));
        }
        Ok(book_id)
    }

    /// Snapshot AI fields and chunk notes keyed by chunk id.
    fn snapshot_chunks(&self, resource_id: &str) -> Result<HashMap<i64, ChunkRecord>> {
        Ok(self
            .store
            .get_chunks(resource_id)?
            .into_iter()
            .map(|c| (c.chunk_id, c))
            .collect())
    }

    /// Delete-then-recreate the full chunk set of a resource. Payloads are
    /// deleted before rows; new payloads are written before their rows so a
    /// crash leaks objects rather than dangling rows.
    async fn rewrite_chunks(
        &self,
        resource_id: &str,
        writes: Vec<ChunkWrite>,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        self.objects.delete_all_for_resource(resource_id).await?;
        self.store.delete_chunks_for_resource(resource_id)?;

        let mut rows = Vec::with_capacity(writes.len());
        for (i, write) in writes.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(NotatError::Cancelled);
            }
            let chunk_id = (i + 1) as i64;
            let text_ref = self
                .objects
                .put_text(resource_id, chunk_id, &write.text)
                .await?;
            rows.push(NewChunk {
                chunk_id,
                text_ref,
                word_count: write.word_count,
                sentence_count: write.sentence_count,
            });
        }

        self.store.upsert_chunk_batch(resource_id, &rows)?;

        for (i, write) in writes.iter().enumerate() {
            let chunk_id = (i + 1) as i64;
            if !write.ai.is_empty() {
                self.store
                    .update_chunk_ai_fields(resource_id, chunk_id, &write.ai)?;
            }
            if let Some(note) = &write.note {
                self.store.update_chunk_note(resource_id, chunk_id, note)?;
            }
        }

        Ok(writes.len())
    }
}

/// Book creation input.
#[derive(Debug)]
pub struct NewBook {
    pub book_id: String,
    pub title: String,
    pub author: Option<String>,
    pub description: Option<String>,
    pub publisher: Option<String>,
    pub year: Option<i64>,
    pub isbn: Option<String>,
    pub chapters: Vec<NewChapter>,
}

/// One chapter in a book creation request.
#[derive(Debug)]
pub struct NewChapter {
    pub chapter_title: String,
    pub chapter_text: String,
}
