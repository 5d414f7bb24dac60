//! Subtitle download and transcript normalization.
//!
//! Uses yt-dlp to download English captions for a video, preferring manual
//! subtitles and falling back to auto-generated ones, then flattens the SRT
//! output into a single plain-text transcript. Auto-captions emit rolling
//! duplicate lines; collapsing those is the defining normalization step.

use crate::error::{NotatError, Result};
use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, instrument};

/// Source of plain-text transcripts for videos.
#[async_trait]
pub trait TranscriptSource: Send + Sync {
    /// Extract the transcript for a video. `Ok(None)` means the video has no
    /// captions, which callers treat as an empty chunk list rather than an
    /// error.
    async fn extract_transcript(&self, video_id: &str) -> Result<Option<String>>;
}

/// yt-dlp-backed subtitle extractor.
pub struct YtDlpSubtitles {
    timeout: Duration,
    filler_markers: Vec<String>,
    temp_dir: PathBuf,
}

impl YtDlpSubtitles {
    pub fn new(temp_dir: &Path, timeout: Duration, filler_markers: Vec<String>) -> Self {
        Self {
            timeout,
            filler_markers,
            temp_dir: temp_dir.to_path_buf(),
        }
    }

    /// Run one yt-dlp invocation writing subtitles into `dir`.
    async fn run_ytdlp(&self, video_id: &str, dir: &Path, auto: bool) -> Result<()> {
        let url = format!("https://www.youtube.com/watch?v={}", video_id);
        let template = dir.join("%(id)s.%(ext)s");

        let mut command = Command::new("yt-dlp");
        command
            .arg("--skip-download")
            .arg(if auto { "--write-auto-subs" } else { "--write-subs" })
            .arg("--sub-langs").arg("en,en-US,en-GB,en-orig")
            .arg("--convert-subs").arg("srt")
            .arg("--output").arg(template.as_os_str())
            .arg("--no-playlist")
            .arg("--quiet")
            .arg("--no-warnings")
            .arg(&url)
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let result = tokio::time::timeout(self.timeout, command.output()).await;

        let output = match result {
            Err(_) => {
                return Err(NotatError::Subtitles(format!(
                    "yt-dlp timed out after {} seconds",
                    self.timeout.as_secs()
                )));
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(NotatError::ToolNotFound("yt-dlp".into()));
            }
            Ok(Err(e)) => {
                return Err(NotatError::Subtitles(format!("yt-dlp execution failed: {e}")));
            }
            Ok(Ok(o)) => o,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("Video unavailable") || stderr.contains("Private video") {
                return Err(NotatError::NotFound(format!(
                    "Video {} is unavailable",
                    video_id
                )));
            }
            return Err(NotatError::Subtitles(format!("yt-dlp failed: {stderr}")));
        }

        Ok(())
    }

    /// Locate a downloaded subtitle file for the video, if any.
    fn find_subtitle_file(dir: &Path, video_id: &str) -> Option<PathBuf> {
        let entries = std::fs::read_dir(dir).ok()?;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(video_id) && name.ends_with(".srt") {
                return Some(entry.path());
            }
        }
        None
    }
}

#[async_trait]
impl TranscriptSource for YtDlpSubtitles {
    #[instrument(skip(self), fields(video_id = %video_id))]
    async fn extract_transcript(&self, video_id: &str) -> Result<Option<String>> {
        std::fs::create_dir_all(&self.temp_dir)?;
        let work_dir = tempfile::tempdir_in(&self.temp_dir)?;

        // Manual captions first, auto-generated as fallback
        self.run_ytdlp(video_id, work_dir.path(), false).await?;
        let mut subtitle_file = Self::find_subtitle_file(work_dir.path(), video_id);

        if subtitle_file.is_none() {
            debug!("No manual captions, trying auto-generated");
            self.run_ytdlp(video_id, work_dir.path(), true).await?;
            subtitle_file = Self::find_subtitle_file(work_dir.path(), video_id);
        }

        let Some(path) = subtitle_file else {
            info!("Video {} has no captions", video_id);
            return Ok(None);
        };

        let raw = std::fs::read_to_string(&path)?;
        let transcript = normalize_subtitles(&raw, &self.filler_markers);

        if transcript.is_empty() {
            return Ok(None);
        }
        Ok(Some(transcript))
    }
}

fn sequence_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+$").expect("Invalid sequence regex"))
}

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("Invalid tag regex"))
}

/// Flatten raw SRT content to a whitespace-normalized transcript.
///
/// Drops sequence-number lines, time-range lines and empties, strips inline
/// tags, removes configured filler markers, and collapses consecutive
/// duplicate lines. Case and punctuation are preserved.
pub fn normalize_subtitles(raw: &str, filler_markers: &[String]) -> String {
    let bracket_fillers: Vec<String> = filler_markers
        .iter()
        .filter(|f| f.starts_with('['))
        .map(|f| f.to_lowercase())
        .collect();
    let word_fillers: Vec<String> = filler_markers
        .iter()
        .filter(|f| !f.starts_with('['))
        .map(|f| f.to_lowercase())
        .collect();

    let mut kept: Vec<String> = Vec::new();

    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || line.contains("-->") || sequence_line_regex().is_match(line) {
            continue;
        }

        let line = tag_regex().replace_all(line, "");

        // Drop bracketed cue markers and standalone filler words
        let cleaned: String = line
            .split_whitespace()
            .filter(|token| {
                let lower = token.to_lowercase();
                if bracket_fillers.iter().any(|f| lower == *f) {
                    return false;
                }
                !word_fillers.iter().any(|f| lower == *f)
            })
            .collect::<Vec<_>>()
            .join(" ");

        if cleaned.is_empty() {
            continue;
        }

        // Rolling auto-captions repeat the previous line; keep one occurrence
        if kept.last().map(String::as_str) == Some(cleaned.as_str()) {
            continue;
        }
        kept.push(cleaned);
    }

    kept.join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}
