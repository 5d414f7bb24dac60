//! HTTP API server.
//!
//! Exposes the pipeline stages, chunk views, notes and book maintenance as a
//! JSON API. Every endpoint except the health check and the email
//! verification probe sits behind bearer-token auth.

mod book;
mod notes;
mod video;

use crate::auth::AuthVerifier;
use crate::error::NotatError;
use crate::orchestrator::Orchestrator;
use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// Shared application state.
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub auth: Arc<AuthVerifier>,
}

/// The authenticated caller's email, stored in request extensions by the
/// auth middleware.
#[derive(Debug, Clone)]
pub struct AuthedUser(pub String);

/// JSON error body.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Wrapper turning pipeline errors into HTTP responses via the error
/// taxonomy.
pub struct ApiError(pub NotatError);

impl<E: Into<NotatError>> From<E> for ApiError {
    fn from(e: E) -> Self {
        ApiError(e.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            warn!("Request failed: {}", self.0);
        }
        (status, Json(ErrorResponse { error: self.0.to_string() })).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Bearer-token middleware. Rejections never include or log the token.
async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let Some(token) = token else {
        return ApiError(NotatError::Unauthorized("Missing bearer token".to_string()))
            .into_response();
    };

    match state.auth.verify_token(token) {
        Ok(email) => {
            request.extensions_mut().insert(AuthedUser(email));
            next.run(request).await
        }
        Err(e) => ApiError(e).into_response(),
    }
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Build the API router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        // Videos and chunks
        .route("/api/video", post(video::create_video))
        .route("/api/video/process-subtitles", post(video::process_subtitles))
        .route("/api/video/process-ai", post(video::process_ai))
        .route("/api/chunks/{video_id}", get(video::get_chunks))
        .route("/api/chunks/{video_id}/index", get(video::get_chunks_index))
        .route("/api/chunks/{video_id}/ai-status", get(video::get_ai_status))
        .route("/api/prompts", get(video::get_prompts))
        // Notes
        .route("/api/note/{video_id}", get(notes::get_note))
        .route("/api/note", post(notes::upsert_note))
        .route("/api/notes", get(notes::list_notes))
        // Books and chapters
        .route("/api/book", post(book::create_book))
        .route("/api/books", get(book::list_books))
        .route("/api/book/process-ai", post(book::process_ai))
        .route("/api/book/{book_id}", get(book::get_book))
        .route("/api/book/{book_id}/chapters", get(book::get_chapters))
        .route("/api/book/{book_id}/chapters/index", get(book::get_chapters_index))
        .route("/api/book/{book_id}/chapters/reorder", post(book::reorder_chapters))
        .route(
            "/api/book/{book_id}/chapter/{chapter_id}",
            get(book::get_chapter).delete(book::delete_chapter),
        )
        .route(
            "/api/book/{book_id}/chapter/{chapter_id}/title",
            put(book::rename_chapter),
        )
        .route(
            "/api/book/{book_id}/chapter/{chapter_id}/text",
            put(book::replace_chapter_text),
        )
        .route(
            "/api/book/{book_id}/chapter/{chapter_id}/note",
            post(book::upsert_chapter_note),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/health", get(health))
        .route("/api/auth/verify-email", post(video::verify_email))
        .merge(protected)
        .layer(cors_layer(
            &state.orchestrator.settings().server.cors_origins,
        ))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| o.parse::<HeaderValue>().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Run the HTTP API server.
pub async fn run_server(state: Arc<AppState>) -> anyhow::Result<()> {
    let settings = state.orchestrator.settings().server.clone();
    let app = build_router(state);

    let addr = format!("{}:{}", settings.host, settings.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Claims;
    use crate::config::{AuthSettings, PromptSet, Prompts, Settings};
    use crate::error::Result;
    use crate::store::{AiFields, ContentKind, FsObjectStore, Resource, SqliteStore};
    use crate::subtitles::TranscriptSource;
    use crate::youtube::VideoMetadataSource;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use tower::ServiceExt;

    const SECRET: &str = "server-test-secret";
    const EMAIL: &str = "alice@example.com";
    const VIDEO: &str = "abc123def45";

    struct StubMetadata;

    #[async_trait]
    impl VideoMetadataSource for StubMetadata {
        async fn fetch_videos(&self, ids: &[String]) -> Result<Vec<Result<Resource>>> {
            Ok(ids
                .iter()
                .map(|id| {
                    Ok(Resource::new(
                        id.clone(),
                        ContentKind::Video,
                        format!("Video {}", id),
                    ))
                })
                .collect())
        }
    }

    struct StubTranscripts;

    #[async_trait]
    impl TranscriptSource for StubTranscripts {
        async fn extract_transcript(&self, _video_id: &str) -> Result<Option<String>> {
            Ok(Some(
                "First sentence of the talk. Second sentence follows here. Third one closes it."
                    .to_string(),
            ))
        }
    }

    struct StubAnnotator;

    #[async_trait]
    impl crate::enrich::Annotator for StubAnnotator {
        async fn annotate(&self, _text: &str, _prompts: &PromptSet) -> AiFields {
            AiFields {
                short_title: Some("Stub Title".to_string()),
                summary: Some("Stub summary".to_string()),
                key_points: Some("- a point".to_string()),
                key_topics: Some("a topic".to_string()),
            }
        }
    }

    fn hex(digest: &[u8; 32]) -> String {
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }

    fn test_state() -> (Arc<AppState>, tempfile::TempDir) {
        let objects_dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.auth = AuthSettings {
            jwt_secret: Some(SECRET.to_string()),
            verified_email_hashes: vec![hex(&AuthVerifier::email_digest(EMAIL))],
        };

        let auth = Arc::new(AuthVerifier::new(&settings.auth));
        let orchestrator = Arc::new(Orchestrator::with_components(
            settings,
            Prompts::default(),
            Arc::new(StubMetadata),
            Arc::new(StubTranscripts),
            Arc::new(StubAnnotator),
            Arc::new(SqliteStore::in_memory().unwrap()),
            Arc::new(FsObjectStore::new(objects_dir.path()).unwrap()),
        ));

        (Arc::new(AppState { orchestrator, auth }), objects_dir)
    }

    fn bearer() -> String {
        let claims = Claims {
            email: EMAIL.to_string(),
            exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        format!("Bearer {}", token)
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value, auth: bool) -> HttpRequest<Body> {
        let mut builder = HttpRequest::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        if auth {
            builder = builder.header("authorization", bearer());
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get_request(uri: &str, auth: bool) -> HttpRequest<Body> {
        let mut builder = HttpRequest::builder().method("GET").uri(uri);
        if auth {
            builder = builder.header("authorization", bearer());
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let (state, _dir) = test_state();
        let response = build_router(state)
            .oneshot(get_request("/health", false))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_token_is_401() {
        let (state, _dir) = test_state();
        let response = build_router(state)
            .oneshot(get_request(&format!("/api/chunks/{}", VIDEO), false))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_verify_email_is_public() {
        let (state, _dir) = test_state();
        let router = build_router(state);

        let response = router
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/auth/verify-email",
                serde_json::json!({"email": EMAIL}),
                false,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["is_verified"], true);

        let response = router
            .oneshot(json_request(
                "POST",
                "/api/auth/verify-email",
                serde_json::json!({"email": "other@example.com"}),
                false,
            ))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["is_verified"], false);
    }

    #[tokio::test]
    async fn test_video_pipeline_over_http() {
        let (state, _dir) = test_state();
        let router = build_router(state);

        // Metadata
        let response = router
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/video",
                serde_json::json!({"video_url": format!("https://youtu.be/{}", VIDEO)}),
                true,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["id"], VIDEO);

        // Chunks
        let response = router
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/video/process-subtitles",
                serde_json::json!({"video_id": VIDEO}),
                true,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["chunk_count"], 1);

        // Chunk listing and index
        let response = router
            .clone()
            .oneshot(get_request(&format!("/api/chunks/{}", VIDEO), true))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body.as_array().unwrap().len(), 1);

        let response = router
            .clone()
            .oneshot(get_request(&format!("/api/chunks/{}/index", VIDEO), true))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body[0]["chunk_id"], 1);

        // Initial AI status: nothing present
        let response = router
            .clone()
            .oneshot(get_request(&format!("/api/chunks/{}/ai-status", VIDEO), true))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body[0]["summary_present"], false);

        // Kick off enrichment and poll until the stub's fields land
        let response = router
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/video/process-ai",
                serde_json::json!({"video_id": VIDEO}),
                true,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["started"], true);

        let mut enriched = false;
        for _ in 0..50 {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            let response = router
                .clone()
                .oneshot(get_request(
                    &format!("/api/chunks/{}/ai-status?chunk_id=1", VIDEO),
                    true,
                ))
                .await
                .unwrap();
            let body = body_json(response).await;
            if body[0]["summary_present"] == true {
                enriched = true;
                break;
            }
        }
        assert!(enriched, "enrichment never became visible to polling");
    }

    #[tokio::test]
    async fn test_book_flow_over_http() {
        let (state, _dir) = test_state();
        let router = build_router(state);

        let response = router
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/book",
                serde_json::json!({
                    "book_id": "Deep Work",
                    "title": "Deep Work",
                    "author": "Cal Newport",
                    "chapters": [
                        {"chapter_title": "One", "chapter_text": "Focus is rare. Focus is valuable."},
                        {"chapter_title": "Two", "chapter_text": "Distraction is everywhere."}
                    ]
                }),
                true,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["book_id"], "deep_work");
        assert_eq!(body["chapter_count"], 2);

        // One chapter with text
        let response = router
            .clone()
            .oneshot(get_request(
                "/api/book/deep_work/chapter/2?include_text=true",
                true,
            ))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["chapter_title"], "Two");
        assert_eq!(body["chapter_text"], "Distraction is everywhere.");

        // Reorder, then confirm the index reflects the permutation
        let response = router
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/book/deep_work/chapters/reorder",
                serde_json::json!({"chapter_order": [2, 1]}),
                true,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .clone()
            .oneshot(get_request("/api/book/deep_work/chapters/index", true))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body[0]["short_title"], "Two");
        assert_eq!(body[1]["short_title"], "One");

        // Chapter note
        let response = router
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/book/deep_work/chapter/1/note",
                serde_json::json!({"note_content": "# margin note"}),
                true,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Delete a chapter; ids stay dense
        let mut builder = HttpRequest::builder()
            .method("DELETE")
            .uri("/api/book/deep_work/chapter/1")
            .header("authorization", bearer());
        builder = builder.header("content-type", "application/json");
        let response = router
            .clone()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .clone()
            .oneshot(get_request("/api/book/deep_work/chapters/index", true))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["chunk_id"], 1);
        assert_eq!(body[0]["short_title"], "One");
    }

    #[tokio::test]
    async fn test_notes_over_http() {
        let (state, _dir) = test_state();
        let router = build_router(state);

        let response = router
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/note",
                serde_json::json!({
                    "video_id": VIDEO,
                    "note_content": "# my notes",
                    "custom_tags": ["study"]
                }),
                true,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .clone()
            .oneshot(get_request(&format!("/api/note/{}", VIDEO), true))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["note_content"], "# my notes");
        assert_eq!(body["custom_tags"][0], "study");

        let response = router
            .clone()
            .oneshot(get_request("/api/notes?limit=10", true))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body.as_array().unwrap().len(), 1);

        let response = router
            .oneshot(get_request("/api/note/unknown_id", true))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_prompts_endpoint() {
        let (state, _dir) = test_state();
        let router = build_router(state);

        let response = router
            .clone()
            .oneshot(get_request("/api/prompts?content_type=book", true))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert!(body["key_points"]["template"]
            .as_str()
            .unwrap()
            .contains("concepts"));

        let response = router
            .oneshot(get_request("/api/prompts?content_type=podcast", true))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
