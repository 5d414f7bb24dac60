//! Pre-flight checks before expensive operations.
//!
//! Validates that required tools and configuration are available
//! before starting operations that would otherwise fail midway.

use crate::config::Settings;
use crate::error::{NotatError, Result};
use std::process::Command;

/// Requirements for different operations.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// The full pipeline needs yt-dlp plus both API keys.
    Process,
    /// Enrichment needs the OpenAI key only.
    Enrich,
}

/// Run pre-flight checks for the given operation.
///
/// Returns Ok(()) if all checks pass, or an error describing what's missing.
pub fn check(operation: Operation, settings: &Settings) -> Result<()> {
    match operation {
        Operation::Process => {
            check_youtube_key(settings)?;
            check_openai_key()?;
            check_tool("yt-dlp")?;
        }
        Operation::Enrich => {
            check_openai_key()?;
        }
    }
    Ok(())
}

fn check_openai_key() -> Result<()> {
    if !crate::openai::is_api_key_configured() {
        return Err(NotatError::Config(
            "OPENAI_API_KEY environment variable is not set".to_string(),
        ));
    }
    Ok(())
}

fn check_youtube_key(settings: &Settings) -> Result<()> {
    if settings.youtube.api_key.as_deref().unwrap_or("").is_empty() {
        return Err(NotatError::Config(
            "YouTube API key is not configured (set YOUTUBE_API_KEY)".to_string(),
        ));
    }
    Ok(())
}

fn check_tool(name: &str) -> Result<()> {
    let available = Command::new(name)
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false);

    if !available {
        return Err(NotatError::ToolNotFound(name.to_string()));
    }
    Ok(())
}
