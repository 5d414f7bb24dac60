//! Book and chapter endpoints.

use super::{ApiResult, AppState};
use crate::error::NotatError;
use crate::orchestrator::{NewBook, NewChapter};
use crate::store::{ChunkIndexEntry, ChunkRecord, ContentKind, Resource, ResourceFilter};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Deserialize)]
pub struct ChapterInput {
    chapter_title: String,
    chapter_text: String,
}

#[derive(Deserialize)]
pub struct CreateBookRequest {
    book_id: String,
    title: String,
    author: Option<String>,
    description: Option<String>,
    publisher: Option<String>,
    year: Option<i64>,
    isbn: Option<String>,
    chapters: Vec<ChapterInput>,
}

#[derive(Serialize)]
pub struct CreateBookResponse {
    book_id: String,
    title: String,
    chapter_count: usize,
}

/// Create a book with its chapters; the chapter list in the body is the
/// authoritative sequence.
pub async fn create_book(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateBookRequest>,
) -> ApiResult<Json<CreateBookResponse>> {
    let (resource, chapter_count) = state
        .orchestrator
        .create_book(NewBook {
            book_id: req.book_id,
            title: req.title,
            author: req.author,
            description: req.description,
            publisher: req.publisher,
            year: req.year,
            isbn: req.isbn,
            chapters: req
                .chapters
                .into_iter()
                .map(|c| NewChapter {
                    chapter_title: c.chapter_title,
                    chapter_text: c.chapter_text,
                })
                .collect(),
        })
        .await?;

    Ok(Json(CreateBookResponse {
        book_id: resource.id,
        title: resource.title,
        chapter_count,
    }))
}

pub async fn list_books(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<Resource>>> {
    Ok(Json(state.orchestrator.store().list_resources(
        &ResourceFilter {
            kind: Some(ContentKind::Book),
            ..Default::default()
        },
    )?))
}

pub async fn get_book(
    State(state): State<Arc<AppState>>,
    Path(book_id): Path<String>,
) -> ApiResult<Json<Resource>> {
    let resource = state
        .orchestrator
        .store()
        .get_resource(&book_id)?
        .filter(|r| r.kind == ContentKind::Book)
        .ok_or_else(|| NotatError::NotFound(format!("Book not found: {}", book_id)))?;
    Ok(Json(resource))
}

#[derive(Serialize)]
pub struct ChapterResponse {
    chapter_id: i64,
    chapter_title: Option<String>,
    word_count: i64,
    sentence_count: i64,
    summary: Option<String>,
    key_points: Option<String>,
    key_topics: Option<String>,
    note_content: Option<String>,
    updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    chapter_text: Option<String>,
}

impl ChapterResponse {
    fn from_record(record: ChunkRecord, text: Option<String>) -> Self {
        Self {
            chapter_id: record.chunk_id,
            chapter_title: record.ai.short_title,
            word_count: record.word_count,
            sentence_count: record.sentence_count,
            summary: record.ai.summary,
            key_points: record.ai.key_points,
            key_topics: record.ai.key_topics,
            note_content: record.note_content,
            updated_at: record.updated_at,
            chapter_text: text,
        }
    }
}

/// Full chapter list, text included.
pub async fn get_chapters(
    State(state): State<Arc<AppState>>,
    Path(book_id): Path<String>,
) -> ApiResult<Json<Vec<ChapterResponse>>> {
    let store = state.orchestrator.store();
    store
        .get_resource(&book_id)?
        .filter(|r| r.kind == ContentKind::Book)
        .ok_or_else(|| NotatError::NotFound(format!("Book not found: {}", book_id)))?;

    let objects = state.orchestrator.objects();
    let mut chapters = Vec::new();
    for record in store.get_chunks(&book_id)? {
        let text = objects.get_text(&record.text_ref).await?;
        chapters.push(ChapterResponse::from_record(record, Some(text)));
    }
    Ok(Json(chapters))
}

/// Lightweight chapter listing.
pub async fn get_chapters_index(
    State(state): State<Arc<AppState>>,
    Path(book_id): Path<String>,
) -> ApiResult<Json<Vec<ChunkIndexEntry>>> {
    Ok(Json(state.orchestrator.store().get_chunks_index(&book_id)?))
}

#[derive(Deserialize)]
pub struct GetChapterQuery {
    #[serde(default)]
    include_text: bool,
}

pub async fn get_chapter(
    State(state): State<Arc<AppState>>,
    Path((book_id, chapter_id)): Path<(String, i64)>,
    Query(query): Query<GetChapterQuery>,
) -> ApiResult<Json<ChapterResponse>> {
    let record = state
        .orchestrator
        .store()
        .get_chunk(&book_id, chapter_id)?
        .ok_or_else(|| {
            NotatError::NotFound(format!("Chapter {} of {} not found", chapter_id, book_id))
        })?;

    let text = if query.include_text {
        Some(state.orchestrator.objects().get_text(&record.text_ref).await?)
    } else {
        None
    };
    Ok(Json(ChapterResponse::from_record(record, text)))
}

#[derive(Deserialize)]
pub struct RenameChapterRequest {
    chapter_title: String,
}

#[derive(Serialize)]
pub struct OkResponse {
    ok: bool,
}

pub async fn rename_chapter(
    State(state): State<Arc<AppState>>,
    Path((book_id, chapter_id)): Path<(String, i64)>,
    Json(req): Json<RenameChapterRequest>,
) -> ApiResult<Json<OkResponse>> {
    state
        .orchestrator
        .rename_chapter(&book_id, chapter_id, &req.chapter_title)
        .await?;
    Ok(Json(OkResponse { ok: true }))
}

#[derive(Deserialize)]
pub struct ReplaceChapterTextRequest {
    chapter_text: String,
}

/// Replace a chapter's text; the stored payload is wiped and rewritten.
pub async fn replace_chapter_text(
    State(state): State<Arc<AppState>>,
    Path((book_id, chapter_id)): Path<(String, i64)>,
    Json(req): Json<ReplaceChapterTextRequest>,
) -> ApiResult<Json<OkResponse>> {
    state
        .orchestrator
        .replace_chapter_text(&book_id, chapter_id, &req.chapter_text)
        .await?;
    Ok(Json(OkResponse { ok: true }))
}

#[derive(Deserialize)]
pub struct ReorderChaptersRequest {
    chapter_order: Vec<i64>,
}

#[derive(Serialize)]
pub struct ReorderChaptersResponse {
    chapter_count: usize,
}

/// Reorder chapters: ids are densified to `1..N` preserving the requested
/// permutation.
pub async fn reorder_chapters(
    State(state): State<Arc<AppState>>,
    Path(book_id): Path<String>,
    Json(req): Json<ReorderChaptersRequest>,
) -> ApiResult<Json<ReorderChaptersResponse>> {
    let chapter_count = state
        .orchestrator
        .reorder_chapters(&book_id, &req.chapter_order)
        .await?;
    Ok(Json(ReorderChaptersResponse { chapter_count }))
}

pub async fn delete_chapter(
    State(state): State<Arc<AppState>>,
    Path((book_id, chapter_id)): Path<(String, i64)>,
) -> ApiResult<Json<OkResponse>> {
    state.orchestrator.delete_chapter(&book_id, chapter_id).await?;
    Ok(Json(OkResponse { ok: true }))
}

#[derive(Deserialize)]
pub struct ChapterNoteRequest {
    note_content: String,
}

pub async fn upsert_chapter_note(
    State(state): State<Arc<AppState>>,
    Path((book_id, chapter_id)): Path<(String, i64)>,
    Json(req): Json<ChapterNoteRequest>,
) -> ApiResult<Json<OkResponse>> {
    let updated = state
        .orchestrator
        .store()
        .update_chunk_note(&book_id, chapter_id, &req.note_content)?;
    if !updated {
        return Err(NotatError::NotFound(format!(
            "Chapter {} of {} not found",
            chapter_id, book_id
        ))
        .into());
    }
    Ok(Json(OkResponse { ok: true }))
}

#[derive(Deserialize)]
pub struct BookAiRequest {
    book_id: String,
}

/// Kick off enrichment for a book's chapters.
pub async fn process_ai(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BookAiRequest>,
) -> ApiResult<Json<super::video::StartedResponse>> {
    state
        .orchestrator
        .store()
        .get_resource(&req.book_id)?
        .filter(|r| r.kind == ContentKind::Book)
        .ok_or_else(|| NotatError::NotFound(format!("Book not found: {}", req.book_id)))?;

    super::video::spawn_enrichment(state.orchestrator.clone(), req.book_id);
    Ok(Json(super::video::StartedResponse { started: true }))
}
