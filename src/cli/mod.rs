//! CLI module for Notat.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use clap::{Parser, Subcommand};

/// Notat - study notes from videos and books
///
/// Ingests YouTube videos and books, chunks their text, enriches every chunk
/// with LLM-generated study fields, and serves the result over a JSON API.
/// The name "Notat" comes from the Norwegian word for "note."
#[derive(Parser, Debug)]
#[command(name = "notat")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize Notat and verify system requirements
    Init,

    /// Check system requirements and configuration
    Doctor,

    /// Run the full pipeline for a video: metadata, chunks, enrichment
    Process {
        /// YouTube URL or 11-character video ID
        input: String,

        /// Stop after the metadata stage
        #[arg(long)]
        metadata_only: bool,

        /// Skip the enrichment stage
        #[arg(long)]
        no_enrich: bool,
    },

    /// Enrich the stored chunks of a resource
    Enrich {
        /// Video ID or book slug
        resource_id: String,

        /// Re-run chunks that are already fully enriched
        #[arg(short, long)]
        force: bool,
    },

    /// List ingested resources
    List,

    /// Delete a resource with its chunks and payloads (notes survive)
    Remove {
        /// Video ID or book slug
        resource_id: String,
    },

    /// Run the HTTP API server
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
}
