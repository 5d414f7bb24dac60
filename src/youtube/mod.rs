//! YouTube Data API metadata fetcher.
//!
//! Batch-resolves video IDs to structured metadata. The upstream `videos`
//! endpoint accepts at most 50 IDs per call, so larger inputs are fetched in
//! batches. Every external payload is parsed into typed structs; only the
//! thumbnail and localization blobs stay opaque JSON.

use crate::error::{NotatError, Result};
use crate::store::{ContentKind, Resource};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Upstream limit on IDs per `videos.list` call.
const MAX_IDS_PER_CALL: usize = 50;

/// Retry schedule for transient upstream failures.
const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE_MS: u64 = 500;
const RETRY_FACTOR: u64 = 2;

const VIDEOS_ENDPOINT: &str = "https://www.googleapis.com/youtube/v3/videos";

fn video_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?x)
            (?:
                # Full YouTube URLs
                (?:https?://)?
                (?:www\.)?
                (?:youtube\.com/watch\?v=|youtu\.be/|youtube\.com/embed/|youtube\.com/v/)
                ([a-zA-Z0-9_-]{11})
            )
            |
            # Bare video ID (11 characters)
            ^([a-zA-Z0-9_-]{11})$
        ",
        )
        .expect("Invalid video ID regex")
    })
}

/// Extract a video ID from a YouTube URL or bare ID.
pub fn extract_video_id(input: &str) -> Option<String> {
    let caps = video_id_regex().captures(input.trim())?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().to_string())
}

/// Like [`extract_video_id`] but with the invalid-input error attached.
pub fn parse_video_input(input: &str) -> Result<String> {
    extract_video_id(input).ok_or_else(|| {
        NotatError::InvalidInput(format!("Invalid YouTube video ID or URL: {}", input))
    })
}

/// Trait for video metadata providers.
#[async_trait]
pub trait VideoMetadataSource: Send + Sync {
    /// Fetch metadata for a batch of IDs. The output is aligned with the
    /// input: missing IDs come back as per-position `NotFound` errors rather
    /// than being dropped. The outer error covers call-level failures (quota
    /// exhaustion, exhausted retries).
    async fn fetch_videos(&self, ids: &[String]) -> Result<Vec<Result<Resource>>>;

    /// Fetch metadata for a single ID.
    async fn fetch_video(&self, id: &str) -> Result<Resource> {
        let mut results = self.fetch_videos(&[id.to_string()]).await?;
        results
            .pop()
            .unwrap_or_else(|| Err(NotatError::NotFound(format!("Video not found: {}", id))))
    }
}

/// YouTube Data API client.
pub struct YoutubeClient {
    http: reqwest::Client,
    api_key: String,
}

impl YoutubeClient {
    pub fn new(api_key: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotatError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_key: api_key.to_string(),
        })
    }

    /// Fetch one batch of at most [`MAX_IDS_PER_CALL`] IDs, with retries on
    /// transient failures.
    #[instrument(skip(self), fields(count = ids.len()))]
    async fn fetch_batch(&self, ids: &[String]) -> Result<Vec<VideoItem>> {
        let id_param = ids.join(",");

        let mut last_err = None;
        for attempt in 0..RETRY_ATTEMPTS {
            if attempt > 0 {
                let delay = RETRY_BASE_MS * RETRY_FACTOR.pow(attempt - 1);
                warn!("Retrying YouTube API call in {} ms", delay);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            match self.fetch_batch_once(&id_param).await {
                Ok(items) => return Ok(items),
                Err(e) if e.is_transient() => last_err = Some(e),
                Err(e) => return Err(e),
            }
        }

        Err(last_err
            .unwrap_or_else(|| NotatError::Upstream("YouTube API retries exhausted".to_string())))
    }

    async fn fetch_batch_once(&self, id_param: &str) -> Result<Vec<VideoItem>> {
        let response = self
            .http
            .get(VIDEOS_ENDPOINT)
            .query(&[
                ("part", "snippet,contentDetails,statistics"),
                ("id", id_param),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| NotatError::Upstream(format!("YouTube API request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            let body: VideoListResponse = response.json().await.map_err(|e| {
                NotatError::Upstream(format!("Invalid YouTube API response: {}", e))
            })?;
            return Ok(body.items);
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_api_error(status.as_u16(), &body))
    }
}

#[async_trait]
impl VideoMetadataSource for YoutubeClient {
    async fn fetch_videos(&self, ids: &[String]) -> Result<Vec<Result<Resource>>> {
        let mut found: std::collections::HashMap<String, Resource> =
            std::collections::HashMap::new();

        for batch in ids.chunks(MAX_IDS_PER_CALL) {
            let items = self.fetch_batch(batch).await?;
            debug!("Fetched {} of {} videos in batch", items.len(), batch.len());
            for item in items {
                let resource = item.into_resource();
                found.insert(resource.id.clone(), resource);
            }
        }

        Ok(ids
            .iter()
            .map(|id| {
                found
                    .remove(id)
                    .ok_or_else(|| NotatError::NotFound(format!("Video not found: {}", id)))
            })
            .collect())
    }
}

/// Map an upstream error response to the client-visible taxonomy.
fn classify_api_error(status: u16, body: &str) -> NotatError {
    if status == 403 || status == 429 {
        let reason = serde_json::from_str::<ApiErrorResponse>(body)
            .ok()
            .and_then(|e| e.error.errors.into_iter().next())
            .map(|e| e.reason)
            .unwrap_or_default();
        if reason.contains("quota") || reason.contains("rateLimit") || status == 429 {
            return NotatError::QuotaExceeded(format!("YouTube API quota exhausted ({})", reason));
        }
    }

    if (400..500).contains(&status) {
        NotatError::InvalidInput(format!("YouTube API rejected the request ({})", status))
    } else {
        NotatError::Upstream(format!("YouTube API error ({})", status))
    }
}

// === Wire types ===

#[derive(Debug, Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoItem {
    id: String,
    snippet: Option<VideoSnippet>,
    content_details: Option<ContentDetails>,
    statistics: Option<VideoStatistics>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct VideoSnippet {
    title: String,
    description: Option<String>,
    channel_title: Option<String>,
    published_at: Option<String>,
    tags: Option<Vec<String>>,
    thumbnails: Option<serde_json::Value>,
    localized: Option<serde_json::Value>,
    default_language: Option<String>,
    default_audio_language: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ContentDetails {
    duration: Option<String>,
}

// Statistics counters arrive as strings on the wire.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct VideoStatistics {
    view_count: Option<String>,
    like_count: Option<String>,
    comment_count: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ApiErrorBody {
    errors: Vec<ApiErrorDetail>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ApiErrorDetail {
    reason: String,
}

impl VideoSnippet {
    /// Whether the source's default language is English.
    fn is_english(&self) -> bool {
        self.default_language
            .as_deref()
            .or(self.default_audio_language.as_deref())
            .map(|lang| lang.to_lowercase().starts_with("en"))
            // No language info at all: treat as English and drop the
            // localized blob, which would just duplicate the snippet.
            .unwrap_or(true)
    }
}

impl VideoItem {
    /// Flatten the upstream payload into a resource row.
    fn into_resource(self) -> Resource {
        let stats = self.statistics.unwrap_or_default();
        let details = self.content_details.unwrap_or_default();
        let snippet = self.snippet.unwrap_or_default();

        let mut resource = Resource::new(self.id, ContentKind::Video, snippet.title.clone());
        resource.description = snippet.description.clone();
        resource.creator = snippet.channel_title.clone();
        resource.duration = details.duration;
        resource.tags = snippet.tags.clone().unwrap_or_default();
        resource.published_at = snippet
            .published_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));
        resource.thumbnails = snippet.thumbnails.clone();
        resource.localized = if snippet.is_english() {
            None
        } else {
            snippet.localized.clone()
        };
        resource.view_count = parse_count(stats.view_count.as_deref());
        resource.like_count = parse_count(stats.like_count.as_deref());
        resource.comment_count = parse_count(stats.comment_count.as_deref());
        resource
    }
}

fn parse_count(value: Option<&str>) -> Option<i64> {
    value.and_then(|v| v.parse::<i64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_video_id_forms() {
        for input in [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ",
            "https://youtube.com/embed/dQw4w9WgXcQ",
            "https://www.youtube.com/v/dQw4w9WgXcQ",
            "dQw4w9WgXcQ",
            "  dQw4w9WgXcQ  ",
        ] {
            assert_eq!(
                extract_video_id(input).as_deref(),
                Some("dQw4w9WgXcQ"),
                "failed for {}",
                input
            );
        }

        assert_eq!(extract_video_id("too-short"), None);
        assert_eq!(extract_video_id(""), None);
        assert_eq!(extract_video_id("exactly12chars!"), None);
    }

    #[test]
    fn test_parse_video_input_error() {
        let err = parse_video_input("too-short").unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_flatten_payload() {
        let json = serde_json::json!({
            "id": "dQw4w9WgXcQ",
            "snippet": {
                "title": "Test Video",
                "description": "A description",
                "channelTitle": "Test Channel",
                "publishedAt": "2009-10-25T06:57:33Z",
                "tags": ["music", "80s"],
                "thumbnails": {"default": {"url": "http://x/y.jpg"}},
                "localized": {"title": "Test Video"},
                "defaultAudioLanguage": "en"
            },
            "contentDetails": {"duration": "PT3M33S"},
            "statistics": {
                "viewCount": "1000000000",
                "likeCount": "12345",
                "commentCount": "678"
            }
        });

        let item: VideoItem = serde_json::from_value(json).unwrap();
        let resource = item.into_resource();

        assert_eq!(resource.id, "dQw4w9WgXcQ");
        assert_eq!(resource.kind, ContentKind::Video);
        assert_eq!(resource.title, "Test Video");
        assert_eq!(resource.creator.as_deref(), Some("Test Channel"));
        assert_eq!(resource.duration.as_deref(), Some("PT3M33S"));
        assert_eq!(resource.tags, vec!["music", "80s"]);
        assert_eq!(resource.view_count, Some(1_000_000_000));
        assert_eq!(resource.like_count, Some(12_345));
        assert!(resource.thumbnails.is_some());
        // English source: localized blob dropped
        assert!(resource.localized.is_none());
        assert!(resource.published_at.is_some());
    }

    #[test]
    fn test_localized_kept_for_non_english() {
        let json = serde_json::json!({
            "id": "abcdefghijk",
            "snippet": {
                "title": "Tittel",
                "defaultLanguage": "no",
                "localized": {"title": "Title in English"}
            }
        });
        let item: VideoItem = serde_json::from_value(json).unwrap();
        let resource = item.into_resource();
        assert!(resource.localized.is_some());
    }

    #[test]
    fn test_missing_sections_tolerated() {
        let json = serde_json::json!({"id": "abcdefghijk"});
        let item: VideoItem = serde_json::from_value(json).unwrap();
        let resource = item.into_resource();
        assert_eq!(resource.title, "");
        assert!(resource.view_count.is_none());
    }

    #[test]
    fn test_classify_api_error() {
        let quota_body = r#"{"error": {"errors": [{"reason": "quotaExceeded"}]}}"#;
        assert_eq!(classify_api_error(403, quota_body).status_code(), 429);
        assert_eq!(classify_api_error(429, "").status_code(), 429);
        assert_eq!(classify_api_error(400, "{}").status_code(), 400);
        assert_eq!(classify_api_error(403, "{}").status_code(), 400);
        assert!(classify_api_error(500, "").is_transient());
        assert!(classify_api_error(503, "").is_transient());
    }
}
