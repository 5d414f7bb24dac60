//! LLM enrichment of chunks.
//!
//! Each chunk gets four fields (a short title plus three analytical fields),
//! each produced by an independent chat-completion call so a failure on one
//! field never takes down the others. The bulk entry point fans chunks out
//! across a bounded worker pool and restores input order on the way back.

use crate::config::{EnrichmentSettings, PromptSet, PromptTemplate};
use crate::error::{NotatError, Result};
use crate::openai::create_client_with_timeout;
use crate::store::AiFields;
use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Retry schedule for a single field call.
const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE_MS: u64 = 1_000;
const RETRY_CAP_MS: u64 = 10_000;

/// Produces the four enrichment fields for one chunk of text.
///
/// Implementations absorb per-field failures: a field that cannot be
/// generated comes back as `None`.
#[async_trait]
pub trait Annotator: Send + Sync {
    async fn annotate(&self, text: &str, prompts: &PromptSet) -> AiFields;
}

/// OpenAI-backed annotator.
pub struct OpenAiAnnotator {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: String,
    temperature: f32,
    max_tokens_title: u32,
    max_tokens_other: u32,
}

impl OpenAiAnnotator {
    pub fn new(settings: &EnrichmentSettings) -> Self {
        Self {
            client: create_client_with_timeout(Duration::from_secs(settings.timeout_seconds)),
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens_title: settings.max_tokens_title,
            max_tokens_other: settings.max_tokens_other,
        }
    }

    /// One chat-completion call, without retries.
    async fn complete_once(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let message = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt.to_string())
            .build()
            .map_err(|e| NotatError::OpenAI(e.to_string()))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(vec![message.into()])
            .temperature(self.temperature)
            .max_tokens(max_tokens)
            .build()
            .map_err(|e| NotatError::OpenAI(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(classify_openai_error)?;

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.as_ref())
            .map(|s| s.trim().to_string())
            .unwrap_or_default();

        Ok(content)
    }

    /// Generate one field with retries on transient failures. Exhausted
    /// retries and permanent failures both yield `None`.
    async fn generate_field(&self, template: &PromptTemplate, text: &str, max_tokens: u32) -> Option<String> {
        let prompt = template.render(text);

        let mut last_err = None;
        for attempt in 0..RETRY_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(backoff_delay(attempt)).await;
            }

            match self.complete_once(&prompt, max_tokens).await {
                Ok(content) if !content.is_empty() => return Some(content),
                Ok(_) => {
                    last_err = Some(NotatError::OpenAI("Empty completion".to_string()));
                }
                Err(e) if e.is_transient() => {
                    warn!("Transient enrichment failure (attempt {}): {}", attempt + 1, e);
                    last_err = Some(e);
                }
                Err(e) => {
                    warn!("Enrichment field failed permanently: {}", e);
                    return None;
                }
            }
        }

        if let Some(e) = last_err {
            warn!("Enrichment field gave up after {} attempts: {}", RETRY_ATTEMPTS, e);
        }
        None
    }
}

#[async_trait]
impl Annotator for OpenAiAnnotator {
    #[instrument(skip_all)]
    async fn annotate(&self, text: &str, prompts: &PromptSet) -> AiFields {
        // Four independent calls; failures are isolated per field
        let (short_title, summary, key_points, key_topics) = tokio::join!(
            self.generate_field(&prompts.short_title, text, self.max_tokens_title),
            self.generate_field(&prompts.summary, text, self.max_tokens_other),
            self.generate_field(&prompts.key_points, text, self.max_tokens_other),
            self.generate_field(&prompts.key_topics, text, self.max_tokens_other),
        );

        AiFields {
            short_title,
            summary,
            key_points,
            key_topics,
        }
        .normalized()
    }
}

/// Exponential backoff with uniform jitter, capped.
fn backoff_delay(attempt: u32) -> Duration {
    let exp = RETRY_BASE_MS.saturating_mul(2u64.saturating_pow(attempt - 1));
    let capped = exp.min(RETRY_CAP_MS);
    let jitter = rand::thread_rng().gen_range(0..=capped / 2);
    Duration::from_millis(capped + jitter)
}

/// Map an OpenAI error into the taxonomy, marking timeouts, rate limits and
/// server errors as transient.
fn classify_openai_error(e: OpenAIError) -> NotatError {
    let msg = e.to_string();
    let transient = matches!(e, OpenAIError::Reqwest(_))
        || ["429", "500", "502", "503", "504", "rate limit", "timed out", "overloaded"]
            .iter()
            .any(|p| msg.to_lowercase().contains(&p.to_lowercase()));

    if transient {
        NotatError::Upstream(format!("OpenAI: {}", msg))
    } else {
        NotatError::OpenAI(msg)
    }
}

/// One enriched chunk, keyed by its position.
#[derive(Debug, Clone)]
pub struct EnrichedChunk {
    pub chunk_id: i64,
    pub fields: AiFields,
}

/// Bulk enricher with bounded parallelism.
pub struct Enricher {
    annotator: Arc<dyn Annotator>,
    max_workers: usize,
}

impl Enricher {
    pub fn new(annotator: Arc<dyn Annotator>, max_workers: usize) -> Self {
        Self {
            annotator,
            max_workers: max_workers.max(1),
        }
    }

    /// Enrich many chunks concurrently. The returned list is ordered by
    /// `chunk_id` regardless of completion order. Cancelled chunks come back
    /// with empty fields.
    #[instrument(skip_all, fields(count = chunks.len()))]
    pub async fn enrich_all(
        &self,
        chunks: Vec<(i64, String)>,
        prompts: &PromptSet,
        cancel: &CancellationToken,
        progress: Option<Arc<AtomicU64>>,
    ) -> Vec<EnrichedChunk> {
        let mut results: Vec<EnrichedChunk> = stream::iter(chunks)
            .map(|(chunk_id, text)| {
                let annotator = self.annotator.clone();
                let prompts = prompts.clone();
                let cancel = cancel.clone();
                let progress = progress.clone();
                async move {
                    let fields = if cancel.is_cancelled() {
                        AiFields::default()
                    } else {
                        tokio::select! {
                            fields = annotator.annotate(&text, &prompts) => fields,
                            _ = cancel.cancelled() => AiFields::default(),
                        }
                    };
                    if let Some(p) = progress {
                        p.fetch_add(1, Ordering::Relaxed);
                    }
                    debug!("Enriched chunk {}", chunk_id);
                    EnrichedChunk { chunk_id, fields }
                }
            })
            .buffer_unordered(self.max_workers)
            .collect()
            .await;

        results.sort_by_key(|r| r.chunk_id);
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Prompts;

    /// Annotator that echoes deterministic fields after a per-chunk delay.
    struct StubAnnotator {
        /// Chunk texts that should come back with no fields at all.
        fail_on: Vec<String>,
    }

    #[async_trait]
    impl Annotator for StubAnnotator {
        async fn annotate(&self, text: &str, _prompts: &PromptSet) -> AiFields {
            // Earlier chunks sleep longer, so completion order inverts
            // submission order unless fan-in restores it.
            let delay = 50u64.saturating_sub(text.len() as u64);
            tokio::time::sleep(Duration::from_millis(delay)).await;

            if self.fail_on.contains(&text.to_string()) {
                return AiFields::default();
            }
            AiFields {
                short_title: Some(format!("title for {}", text)),
                summary: Some(format!("summary for {}", text)),
                key_points: None,
                key_topics: None,
            }
        }
    }

    fn chunks(n: usize) -> Vec<(i64, String)> {
        (1..=n)
            .map(|i| (i as i64, format!("{}", "x".repeat(i))))
            .collect()
    }

    #[tokio::test]
    async fn test_enrich_all_preserves_order() {
        let enricher = Enricher::new(Arc::new(StubAnnotator { fail_on: vec![] }), 4);
        let prompts = Prompts::default();
        let input = chunks(8);
        let input_ids: Vec<i64> = input.iter().map(|(id, _)| *id).collect();

        let results = enricher
            .enrich_all(input, &prompts.video, &CancellationToken::new(), None)
            .await;

        let out_ids: Vec<i64> = results.iter().map(|r| r.chunk_id).collect();
        assert_eq!(out_ids, input_ids);
        assert!(results.iter().all(|r| r.fields.summary.is_some()));
    }

    #[tokio::test]
    async fn test_failures_absorbed_per_chunk() {
        let enricher = Enricher::new(
            Arc::new(StubAnnotator {
                fail_on: vec!["xx".to_string()],
            }),
            2,
        );
        let prompts = Prompts::default();

        let results = enricher
            .enrich_all(chunks(3), &prompts.video, &CancellationToken::new(), None)
            .await;

        assert_eq!(results.len(), 3);
        assert!(results[0].fields.summary.is_some());
        assert!(results[1].fields.is_empty());
        assert!(results[2].fields.summary.is_some());
    }

    #[tokio::test]
    async fn test_cancellation_yields_empty_fields() {
        let enricher = Enricher::new(Arc::new(StubAnnotator { fail_on: vec![] }), 2);
        let prompts = Prompts::default();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let results = enricher
            .enrich_all(chunks(4), &prompts.video, &cancel, None)
            .await;

        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|r| r.fields.is_empty()));
    }

    #[tokio::test]
    async fn test_progress_counter() {
        let enricher = Enricher::new(Arc::new(StubAnnotator { fail_on: vec![] }), 3);
        let prompts = Prompts::default();
        let progress = Arc::new(AtomicU64::new(0));

        enricher
            .enrich_all(
                chunks(5),
                &prompts.video,
                &CancellationToken::new(),
                Some(progress.clone()),
            )
            .await;

        assert_eq!(progress.load(Ordering::Relaxed), 5);
    }

    #[test]
    fn test_backoff_delay_bounds() {
        for attempt in 1..=3 {
            let delay = backoff_delay(attempt);
            assert!(delay >= Duration::from_millis(RETRY_BASE_MS));
            assert!(delay <= Duration::from_millis(RETRY_CAP_MS + RETRY_CAP_MS / 2));
        }
    }
}
