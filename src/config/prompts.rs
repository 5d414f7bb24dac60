//! Prompt templates for chunk enrichment.
//!
//! Two prompt sets exist, one per content kind (video, book). Each set
//! carries four templates, one per enrichment field, with a single `{text}`
//! substitution site for the chunk text. Sets can be customized by placing
//! TOML files in the custom prompts directory.

use crate::store::ContentKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A single enrichment prompt: a human-readable label and a template.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptTemplate {
    /// Short label describing what the field holds.
    pub description: String,
    /// Template with a `{text}` placeholder for the chunk text.
    pub template: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            description: String::new(),
            template: "{text}".to_string(),
        }
    }
}

impl PromptTemplate {
    /// Substitute the chunk text into the template.
    pub fn render(&self, text: &str) -> String {
        self.template.replace("{text}", text)
    }
}

/// The four enrichment prompts for one content kind.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PromptSet {
    pub short_title: PromptTemplate,
    pub summary: PromptTemplate,
    pub key_points: PromptTemplate,
    pub key_topics: PromptTemplate,
}

/// Collection of all prompt sets, keyed by content kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Prompts {
    pub video: PromptSet,
    pub book: PromptSet,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            video: PromptSet {
                short_title: PromptTemplate {
                    description: "Segment title".to_string(),
                    template: "Write a title of at most 10 words for this video segment. \
                               Respond with the title only, no quotes.\n\n{text}"
                        .to_string(),
                },
                summary: PromptTemplate {
                    description: "Segment summary".to_string(),
                    template: "Summarize this video segment in a short paragraph. Focus on \
                               what is actually said, not on style.\n\n{text}"
                        .to_string(),
                },
                key_points: PromptTemplate {
                    description: "Key points".to_string(),
                    template: "List the key points of this video segment as concise bullet \
                               points.\n\n{text}"
                        .to_string(),
                },
                key_topics: PromptTemplate {
                    description: "Topics and themes".to_string(),
                    template: "List the topics and themes covered in this video segment, one \
                               per line.\n\n{text}"
                        .to_string(),
                },
            },
            book: PromptSet {
                short_title: PromptTemplate {
                    description: "Section title".to_string(),
                    template: "Write a title of at most 10 words for this book chapter \
                               section. Respond with the title only, no quotes.\n\n{text}"
                        .to_string(),
                },
                summary: PromptTemplate {
                    description: "Section summary".to_string(),
                    template: "Summarize this book chapter section in a short paragraph. \
                               Stay close to the author's argument.\n\n{text}"
                        .to_string(),
                },
                key_points: PromptTemplate {
                    description: "Concepts".to_string(),
                    template: "List the concepts introduced in this book chapter section, \
                               each with a brief explanation.\n\n{text}"
                        .to_string(),
                },
                key_topics: PromptTemplate {
                    description: "Insights and lessons".to_string(),
                    template: "List the key insights and lessons from this book chapter \
                               section, one per line.\n\n{text}"
                        .to_string(),
                },
            },
        }
    }
}

impl Prompts {
    /// Load prompts from defaults, with optional per-kind overrides from a
    /// custom directory (`video.toml`, `book.toml`).
    pub fn load(custom_dir: Option<&str>) -> crate::error::Result<Self> {
        let mut prompts = Prompts::default();

        if let Some(dir) = custom_dir {
            let custom_path = PathBuf::from(shellexpand::tilde(dir).to_string());

            let video_path = custom_path.join("video.toml");
            if video_path.exists() {
                let content = std::fs::read_to_string(&video_path)?;
                prompts.video = toml::from_str(&content)?;
            }

            let book_path = custom_path.join("book.toml");
            if book_path.exists() {
                let content = std::fs::read_to_string(&book_path)?;
                prompts.book = toml::from_str(&content)?;
            }
        }

        Ok(prompts)
    }

    /// The prompt set for a content kind.
    pub fn for_kind(&self, kind: ContentKind) -> &PromptSet {
        match kind {
            ContentKind::Video => &self.video,
            ContentKind::Book => &self.book,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_prompts_have_placeholder() {
        let prompts = Prompts::default();
        for set in [&prompts.video, &prompts.book] {
            for tpl in [&set.short_title, &set.summary, &set.key_points, &set.key_topics] {
                assert!(tpl.template.contains("{text}"));
                // Exactly one substitution site
                assert_eq!(tpl.template.matches("{text}").count(), 1);
            }
        }
    }

    #[test]
    fn test_render() {
        let tpl = PromptTemplate {
            description: "test".to_string(),
            template: "Summarize:\n\n{text}".to_string(),
        };
        assert_eq!(tpl.render("hello world"), "Summarize:\n\nhello world");
    }

    #[test]
    fn test_for_kind() {
        let prompts = Prompts::default();
        assert!(prompts
            .for_kind(ContentKind::Video)
            .key_points
            .template
            .contains("bullet"));
        assert!(prompts
            .for_kind(ContentKind::Book)
            .key_points
            .template
            .contains("concepts"));
    }
}
