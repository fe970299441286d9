//! Frontmatter schemas for the two content kinds.

use serde::{Deserialize, Serialize};

/// Frontmatter for thought entries.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ThoughtMeta {
    /// ISO 8601 date (YYYY-MM-DD).
    pub date: String,
    pub title: String,
    #[serde(default)]
    pub mood: Option<String>,
}

/// Frontmatter for dream entries.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DreamMeta {
    /// ISO 8601 date (YYYY-MM-DD).
    pub date: String,
    pub title: String,
    #[serde(rename = "type")]
    pub dream_type: DreamType,
    #[serde(default)]
    pub immersive: bool,
}

/// Dream content form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DreamType {
    Poetry,
    Ascii,
    Prose,
    Mixed,
}

impl DreamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DreamType::Poetry => "poetry",
            DreamType::Ascii => "ascii",
            DreamType::Prose => "prose",
            DreamType::Mixed => "mixed",
        }
    }
}
