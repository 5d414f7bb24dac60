//! Error types for Notat.

use thiserror::Error;

/// Library-level error type for Notat operations.
#[derive(Error, Debug)]
pub enum NotatError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("API quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Upstream service error: {0}")]
    Upstream(String),

    #[error("Subtitle extraction failed: {0}")]
    Subtitles(String),

    #[error("Object store error: {0}")]
    ObjectStore(String),

    #[error("OpenAI API error: {0}")]
    OpenAI(String),

    #[error("External tool not found: {0}. Please install it and ensure it's in your PATH.")]
    ToolNotFound(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl NotatError {
    /// HTTP status code for the client-visible error taxonomy.
    ///
    /// Transient upstream failures map to 502 so clients know a retry may
    /// succeed; everything not otherwise classified is a 500.
    pub fn status_code(&self) -> u16 {
        match self {
            NotatError::InvalidInput(_) => 400,
            NotatError::Unauthorized(_) => 401,
            NotatError::NotFound(_) => 404,
            NotatError::Conflict(_) => 409,
            NotatError::QuotaExceeded(_) => 429,
            NotatError::Upstream(_) | NotatError::Http(_) => 502,
            _ => 500,
        }
    }

    /// Whether a retry inside the owning component may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, NotatError::Upstream(_) | NotatError::Http(_))
    }
}

/// Result type alias for Notat operations.
pub type Result<T> = std::result::Result<T, NotatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(NotatError::InvalidInput("x".into()).status_code(), 400);
        assert_eq!(NotatError::Unauthorized("x".into()).status_code(), 401);
        assert_eq!(NotatError::NotFound("x".into()).status_code(), 404);
        assert_eq!(NotatError::Conflict("x".into()).status_code(), 409);
        assert_eq!(NotatError::QuotaExceeded("x".into()).status_code(), 429);
        assert_eq!(NotatError::Upstream("x".into()).status_code(), 502);
        assert_eq!(NotatError::Config("x".into()).status_code(), 500);
    }

    #[test]
    fn test_transient_classification() {
        assert!(NotatError::Upstream("503".into()).is_transient());
        assert!(!NotatError::InvalidInput("bad id".into()).is_transient());
        assert!(!NotatError::QuotaExceeded("daily limit".into()).is_transient());
    }
}
