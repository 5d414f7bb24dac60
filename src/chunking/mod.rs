//! Word-count-based chunking of transcripts and chapter text.
//!
//! Splits text into sentence-boundary-aligned chunks with a configurable
//! target size, hard upper bound, word-level overlap between neighboring
//! chunks, and a minimum size for the final chunk.

use crate::config::ChunkingSettings;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Configuration for the word chunker.
#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    /// Preferred chunk size in words.
    pub target_words: usize,
    /// Hard upper bound; a chunk only exceeds this via an oversized sentence
    /// or the final-chunk merge.
    pub max_words: usize,
    /// Trailing words of chunk k replayed as the opening of chunk k+1.
    pub overlap_words: usize,
    /// A final chunk smaller than this is merged into its predecessor.
    pub min_final_words: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_words: 1000,
            max_words: 1500,
            overlap_words: 100,
            min_final_words: 500,
        }
    }
}

impl From<&ChunkingSettings> for ChunkingConfig {
    fn from(s: &ChunkingSettings) -> Self {
        Self {
            target_words: s.target_words,
            max_words: s.max_words,
            overlap_words: s.overlap_words,
            min_final_words: s.min_final_words,
        }
    }
}

/// A chunk of text with its presentation order and size metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextChunk {
    /// Dense 1-based position of this chunk within the resource.
    pub chunk_id: i64,
    /// Chunk text, including the overlap replayed from the previous chunk.
    pub text: String,
    /// Whitespace-split word count.
    pub word_count: i64,
    /// Number of sentence-terminator runs in the text.
    pub sentence_count: i64,
}

fn sentence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // A sentence ends at . ! or ? followed by whitespace or end of input.
    // Abbreviations are not special-cased.
    RE.get_or_init(|| Regex::new(r"(?s).*?[.!?]+(?:\s+|\z)").expect("Invalid sentence regex"))
}

fn terminator_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.!?]+").expect("Invalid terminator regex"))
}

/// Split text into sentences. Trailing text without a terminator is kept as
/// a final sentence.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut last_end = 0;

    for m in sentence_regex().find_iter(text) {
        let sentence = m.as_str().trim();
        if !sentence.is_empty() {
            sentences.push(sentence);
        }
        last_end = m.end();
    }

    let rest = text[last_end..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }

    sentences
}

/// Count sentence-terminator runs in a chunk of text.
pub fn count_sentences(text: &str) -> i64 {
    terminator_regex().find_iter(text).count() as i64
}

/// Word-count-based, sentence-boundary-respecting chunker.
pub struct WordChunker {
    config: ChunkingConfig,
}

/// A chunk under construction: the full word list plus how many of its
/// leading words were replayed from the previous chunk.
struct PendingChunk {
    words: Vec<String>,
    overlap_len: usize,
}

impl WordChunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    /// Chunk the input text. Returns an empty list iff the input contains no
    /// words.
    pub fn chunk(&self, text: &str) -> Vec<TextChunk> {
        let sentences = split_sentences(text);

        let mut pending: Vec<PendingChunk> = Vec::new();
        let mut current: Vec<String> = Vec::new();
        let mut overlap_len = 0usize;

        for sentence in sentences {
            let words: Vec<String> = sentence.split_whitespace().map(str::to_string).collect();
            if words.is_empty() {
                continue;
            }

            // Seal the current chunk if adding this sentence would push it
            // past the target. Overlap-only accumulators don't count as
            // content: an oversized sentence lands in its own chunk instead
            // of producing an overlap-only one.
            let has_content = current.len() > overlap_len;
            if has_content && current.len() + words.len() > self.config.target_words {
                let tail_start = current.len().saturating_sub(self.config.overlap_words);
                let tail: Vec<String> = current[tail_start..].to_vec();
                pending.push(PendingChunk {
                    words: std::mem::take(&mut current),
                    overlap_len,
                });
                current = tail;
                overlap_len = current.len();
            }

            current.extend(words);
        }

        if current.len() > overlap_len {
            pending.push(PendingChunk {
                words: current,
                overlap_len,
            });
        }

        // Merge an undersized final chunk into its predecessor. The replayed
        // overlap is dropped so the merged text carries each word once.
        if pending.len() >= 2
            && pending[pending.len() - 1].words.len() < self.config.min_final_words
        {
            if let Some(last) = pending.pop() {
                let fresh = &last.words[last.overlap_len..];
                if let Some(prev) = pending.last_mut() {
                    prev.words.extend(fresh.iter().cloned());
                }
            }
        }

        pending
            .into_iter()
            .enumerate()
            .map(|(i, p)| {
                let text = p.words.join(" ");
                let sentence_count = count_sentences(&text);
                TextChunk {
                    chunk_id: (i + 1) as i64,
                    word_count: p.words.len() as i64,
                    sentence_count,
                    text,
                }
            })
            .collect()
    }
}

/// Compute word and sentence counts for externally supplied text (book
/// chapters arrive pre-chunked and skip the chunker).
pub fn text_metrics(text: &str) -> (i64, i64) {
    let words = text.split_whitespace().count() as i64;
    (words, count_sentences(text))
}
