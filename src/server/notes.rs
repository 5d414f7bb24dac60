//! Resource-level note endpoints.

use super::{ApiResult, AppState};
use crate::error::NotatError;
use crate::store::{NoteRecord, NoteSummary};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

/// Fetch the note for a resource (videos and books alike).
pub async fn get_note(
    State(state): State<Arc<AppState>>,
    Path(video_id): Path<String>,
) -> ApiResult<Json<NoteRecord>> {
    let note = state
        .orchestrator
        .store()
        .get_note(&video_id)?
        .ok_or_else(|| NotatError::NotFound(format!("No note for {}", video_id)))?;
    Ok(Json(note))
}

#[derive(Deserialize)]
pub struct UpsertNoteRequest {
    video_id: String,
    note_content: String,
    custom_tags: Option<Vec<String>>,
}

/// Create or update a resource-level note.
pub async fn upsert_note(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpsertNoteRequest>,
) -> ApiResult<Json<NoteRecord>> {
    let store = state.orchestrator.store();
    store.upsert_note(&req.video_id, &req.note_content, req.custom_tags.as_deref())?;
    let note = store
        .get_note(&req.video_id)?
        .ok_or_else(|| NotatError::NotFound(format!("No note for {}", req.video_id)))?;
    Ok(Json(note))
}

#[derive(Deserialize)]
pub struct ListNotesQuery {
    limit: Option<usize>,
    channel: Option<String>,
}

/// List notes, optionally filtered to one creator's resources.
pub async fn list_notes(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListNotesQuery>,
) -> ApiResult<Json<Vec<NoteSummary>>> {
    Ok(Json(state.orchestrator.store().list_notes(
        query.limit,
        query.channel.as_deref(),
    )?))
}
