//! Video, chunk-view and prompt endpoints.

use super::{ApiError, ApiResult, AppState};
use crate::error::NotatError;
use crate::store::{ChunkAiStatus, ChunkIndexEntry, ChunkRecord, ContentKind, Resource};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Deserialize)]
pub struct VerifyEmailRequest {
    email: String,
}

#[derive(Serialize)]
pub struct VerifyEmailResponse {
    is_verified: bool,
}

/// Public probe used by the login flow to gate account creation.
pub async fn verify_email(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VerifyEmailRequest>,
) -> Json<VerifyEmailResponse> {
    Json(VerifyEmailResponse {
        is_verified: state.auth.is_email_verified(&req.email),
    })
}

#[derive(Deserialize)]
pub struct CreateVideoRequest {
    video_url: String,
}

/// Fetch and persist video metadata.
pub async fn create_video(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateVideoRequest>,
) -> ApiResult<Json<Resource>> {
    let resource = state.orchestrator.process_metadata(&req.video_url).await?;
    Ok(Json(resource))
}

#[derive(Deserialize)]
pub struct VideoIdRequest {
    video_id: String,
}

#[derive(Serialize)]
pub struct ProcessSubtitlesResponse {
    video_id: String,
    chunk_count: usize,
}

/// Extract subtitles, chunk them, and replace the stored chunk set.
pub async fn process_subtitles(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VideoIdRequest>,
) -> ApiResult<Json<ProcessSubtitlesResponse>> {
    let outcome = state
        .orchestrator
        .process_chunks(&req.video_id, &CancellationToken::new())
        .await?;
    Ok(Json(ProcessSubtitlesResponse {
        video_id: outcome.resource_id,
        chunk_count: outcome.chunk_count,
    }))
}

#[derive(Serialize)]
pub struct StartedResponse {
    pub started: bool,
}

/// Kick off enrichment in the background and return immediately. Progress is
/// observed through the ai-status polling endpoint.
pub async fn process_ai(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VideoIdRequest>,
) -> ApiResult<Json<StartedResponse>> {
    // Fail fast on unknown resources so the client isn't left polling forever
    state
        .orchestrator
        .store()
        .get_resource(&req.video_id)?
        .ok_or_else(|| NotatError::NotFound(format!("Resource not found: {}", req.video_id)))?;

    spawn_enrichment(state.orchestrator.clone(), req.video_id);
    Ok(Json(StartedResponse { started: true }))
}

pub(super) fn spawn_enrichment(orchestrator: Arc<crate::orchestrator::Orchestrator>, id: String) {
    tokio::spawn(async move {
        info!("Background enrichment started for {}", id);
        match orchestrator
            .process_enrichment(&id, true, &CancellationToken::new(), None)
            .await
        {
            Ok(outcome) => info!(
                "Background enrichment for {} attempted {} chunks",
                id, outcome.chunks_attempted
            ),
            Err(e) => error!("Background enrichment for {} failed: {}", id, e),
        }
    });
}

/// Full chunk list: metadata and AI fields, no text.
pub async fn get_chunks(
    State(state): State<Arc<AppState>>,
    Path(video_id): Path<String>,
) -> ApiResult<Json<Vec<ChunkRecord>>> {
    let store = state.orchestrator.store();
    store
        .get_resource(&video_id)?
        .ok_or_else(|| NotatError::NotFound(format!("Resource not found: {}", video_id)))?;
    Ok(Json(store.get_chunks(&video_id)?))
}

/// Minimal chunk listing for dropdowns.
pub async fn get_chunks_index(
    State(state): State<Arc<AppState>>,
    Path(video_id): Path<String>,
) -> ApiResult<Json<Vec<ChunkIndexEntry>>> {
    Ok(Json(state.orchestrator.store().get_chunks_index(&video_id)?))
}

#[derive(Deserialize)]
pub struct AiStatusQuery {
    chunk_id: Option<i64>,
}

/// Polling endpoint: presence (and a short prefix) of enrichment output.
pub async fn get_ai_status(
    State(state): State<Arc<AppState>>,
    Path(video_id): Path<String>,
    Query(query): Query<AiStatusQuery>,
) -> ApiResult<Json<Vec<ChunkAiStatus>>> {
    Ok(Json(
        state
            .orchestrator
            .store()
            .get_chunks_ai_status(&video_id, query.chunk_id)?,
    ))
}

#[derive(Deserialize)]
pub struct PromptsQuery {
    content_type: String,
}

/// The active prompt set for a content kind.
pub async fn get_prompts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PromptsQuery>,
) -> ApiResult<Json<crate::config::PromptSet>> {
    let kind: ContentKind = query
        .content_type
        .parse()
        .map_err(|e: String| ApiError(NotatError::InvalidInput(e)))?;
    Ok(Json(state.orchestrator.prompts().for_kind(kind).clone()))
}
