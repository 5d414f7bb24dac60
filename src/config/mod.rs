//! Configuration management for Notat.

mod prompts;
mod settings;

pub use prompts::{PromptSet, PromptTemplate, Prompts};
pub use settings::{
    AuthSettings, ChunkingSettings, EnrichmentSettings, GeneralSettings, ServerSettings, Settings,
    StorageSettings, SubtitleSettings, YoutubeSettings,
};
