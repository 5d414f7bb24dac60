//! Configuration settings for Notat.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub youtube: YoutubeSettings,
    pub subtitles: SubtitleSettings,
    pub chunking: ChunkingSettings,
    pub enrichment: EnrichmentSettings,
    pub storage: StorageSettings,
    pub server: ServerSettings,
    pub auth: AuthSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for storing application data.
    pub data_dir: String,
    /// Directory for temporary files.
    pub temp_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.notat".to_string(),
            temp_dir: "/tmp/notat".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// YouTube Data API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct YoutubeSettings {
    /// YouTube Data API key. Overridden by the `YOUTUBE_API_KEY` env var.
    pub api_key: Option<String>,
    /// Per-request timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for YoutubeSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            timeout_seconds: 10,
        }
    }
}

/// Subtitle extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubtitleSettings {
    /// Wall-clock timeout for the yt-dlp subprocess, in seconds.
    pub timeout_seconds: u64,
    /// Filler markers stripped from captions before chunking.
    pub filler_markers: Vec<String>,
}

impl Default for SubtitleSettings {
    fn default() -> Self {
        Self {
            timeout_seconds: 120,
            filler_markers: vec![
                "[Music]".to_string(),
                "[Applause]".to_string(),
                "[Laughter]".to_string(),
                "uh".to_string(),
                "um".to_string(),
            ],
        }
    }
}

/// Word-based chunking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    /// Preferred chunk size in words.
    pub target_words: usize,
    /// Hard upper bound on chunk size in words.
    pub max_words: usize,
    /// Trailing words of one chunk replayed at the start of the next.
    pub overlap_words: usize,
    /// Minimum size of the final chunk; smaller ones are merged backwards.
    pub min_final_words: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            target_words: 1000,
            max_words: 1500,
            overlap_words: 100,
            min_final_words: 500,
        }
    }
}

/// LLM enrichment settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentSettings {
    /// Chat model used for all enrichment fields.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Token budget for the short title field.
    pub max_tokens_title: u32,
    /// Token budget for the analytical fields.
    pub max_tokens_other: u32,
    /// Bounded parallelism across chunks. Overridden by `OPENAI_MAX_WORKERS`.
    pub max_workers: usize,
    /// Per-call timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.5,
            max_tokens_title: 50,
            max_tokens_other: 200,
            max_workers: 5,
            timeout_seconds: 60,
        }
    }
}

/// Storage settings: metadata database and chunk-text object store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Path to the SQLite database.
    pub sqlite_path: String,
    /// Root directory of the chunk-text object store.
    pub objects_dir: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            sqlite_path: "~/.notat/notat.db".to_string(),
            objects_dir: "~/.notat/objects".to_string(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins. Empty means allow any (development mode).
    pub cors_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors_origins: Vec::new(),
        }
    }
}

/// Authentication settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct AuthSettings {
    /// Secret for verifying bearer tokens (HS256). Overridden by `NOTAT_JWT_SECRET`.
    pub jwt_secret: Option<String>,
    /// SHA-256 hex digests of lower-cased verified emails.
    pub verified_email_hashes: Vec<String>,
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    ///
    /// Secrets are overridable from the environment so the config file
    /// never has to contain them.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        let mut settings = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str::<Settings>(&content)?
        } else {
            Settings::default()
        };

        settings.apply_env_overrides();
        Ok(settings)
    }

    /// Apply environment variable overrides for secrets and worker count.
    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("YOUTUBE_API_KEY") {
            if !key.is_empty() {
                self.youtube.api_key = Some(key);
            }
        }
        if let Ok(secret) = std::env::var("NOTAT_JWT_SECRET") {
            if !secret.is_empty() {
                self.auth.jwt_secret = Some(secret);
            }
        }
        if let Ok(workers) = std::env::var("OPENAI_MAX_WORKERS") {
            if let Ok(n) = workers.parse::<usize>() {
                if n > 0 {
                    self.enrichment.max_workers = n;
                }
            }
        }
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::NotatError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("notat")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Get the expanded temp directory path.
    pub fn temp_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.temp_dir)
    }

    /// Get the expanded SQLite database path.
    pub fn sqlite_path(&self) -> PathBuf {
        Self::expand_path(&self.storage.sqlite_path)
    }

    /// Get the expanded object store root path.
    pub fn objects_dir(&self) -> PathBuf {
        Self::expand_path(&self.storage.objects_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.chunking.target_words, 1000);
        assert_eq!(settings.chunking.max_words, 1500);
        assert_eq!(settings.chunking.overlap_words, 100);
        assert_eq!(settings.chunking.min_final_words, 500);
        assert_eq!(settings.enrichment.max_workers, 5);
        assert_eq!(settings.enrichment.temperature, 0.5);
        assert_eq!(settings.server.port, 8000);
    }

    #[test]
    fn test_roundtrip_toml() {
        let settings = Settings::default();
        let text = toml::to_string_pretty(&settings).unwrap();
        let parsed: Settings = toml::from_str(&text).unwrap();
        assert_eq!(parsed.chunking.max_words, settings.chunking.max_words);
        assert_eq!(parsed.enrichment.model, settings.enrichment.model);
    }

    #[test]
    fn test_partial_config() {
        let parsed: Settings = toml::from_str("[chunking]\ntarget_words = 600\n").unwrap();
        assert_eq!(parsed.chunking.target_words, 600);
        // Unspecified sections fall back to defaults
        assert_eq!(parsed.chunking.max_words, 1500);
        assert_eq!(parsed.enrichment.max_workers, 5);
    }
}
