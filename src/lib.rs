//! Notat - study notes from videos and books
//!
//! Notat ingests long-form media and turns it into AI-enriched, chunked
//! study artifacts with user-authored markdown notes.
//!
//! The name "Notat" comes from the Norwegian word for "note."
//!
//! # Overview
//!
//! Notat allows you to:
//! - Resolve YouTube video metadata and download subtitles
//! - Split transcripts and book chapters into word-bounded chunks
//! - Enrich every chunk with LLM-generated study fields
//! - Attach markdown notes to resources and individual chunks
//! - Serve everything over a polling-friendly JSON API
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - `config` - Configuration and prompt sets
//! - `youtube` - YouTube Data API metadata fetcher
//! - `subtitles` - Subtitle download and transcript normalization
//! - `chunking` - Word-count-based chunking
//! - `enrich` - LLM enrichment with bounded parallelism
//! - `store` - Metadata store (SQLite) and chunk-text object store
//! - `orchestrator` - Pipeline coordination and per-resource locking
//! - `auth` - Bearer-token verification and the email allowlist
//! - `server` - HTTP API
//!
//! # Example
//!
//! ```rust,no_run
//! use notat::config::Settings;
//! use notat::orchestrator::Orchestrator;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let orchestrator = Orchestrator::new(settings)?;
//!
//!     // Run the full pipeline for a video
//!     let outcome = orchestrator
//!         .process_full("dQw4w9WgXcQ", &CancellationToken::new())
//!         .await?;
//!     println!("Enriched {} chunks", outcome.chunks_attempted);
//!
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod chunking;
pub mod cli;
pub mod config;
pub mod enrich;
pub mod error;
pub mod openai;
pub mod orchestrator;
pub mod server;
pub mod store;
pub mod subtitles;
pub mod youtube;

pub use error::{NotatError, Result};
