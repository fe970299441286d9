//! Normalization of raw filesystem changes into typed domain events.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::config::ContentConfig;

use super::types::{ChangeKind, DomainEvent, EventType, RawChange, Topic};

static VALID_SLUG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_-]*$").expect("slug pattern is valid")
});

/// Extract the slug from a content file name.
///
/// The name must carry the `.md` extension and the stem must start with an
/// alphanumeric, followed by alphanumerics, dashes, or underscores.
pub fn extract_slug(filename: &str) -> Option<&str> {
    let slug = filename.strip_suffix(".md")?;
    if slug.is_empty() || !VALID_SLUG.is_match(slug) {
        return None;
    }
    Some(slug)
}

/// Turns raw filesystem changes into domain events.
///
/// Topic resolution is driven by the configured content roots rather than
/// any global registry; anything outside them is dropped.
#[derive(Debug, Clone)]
pub struct EventNormalizer {
    thoughts_dir: PathBuf,
    dreams_dir: PathBuf,
}

impl EventNormalizer {
    pub fn new(content: &ContentConfig) -> Self {
        Self {
            thoughts_dir: content.thoughts_dir.clone(),
            dreams_dir: content.dreams_dir.clone(),
        }
    }

    /// Determine the topic for a path by matching the watched subtrees.
    fn topic_for(&self, path: &Path) -> Option<Topic> {
        if path.starts_with(&self.thoughts_dir) {
            Some(Topic::Thoughts)
        } else if path.starts_with(&self.dreams_dir) {
            Some(Topic::Dreams)
        } else {
            None
        }
    }

    /// Map (change kind, topic) onto a domain event type.
    ///
    /// The system topic has no content events; those pairs drop silently.
    fn event_type_for(kind: ChangeKind, topic: Topic) -> Option<EventType> {
        match (kind, topic) {
            (ChangeKind::Created, Topic::Thoughts) => Some(EventType::ThoughtCreated),
            (ChangeKind::Modified, Topic::Thoughts) => Some(EventType::ThoughtModified),
            (ChangeKind::Deleted, Topic::Thoughts) => Some(EventType::ThoughtDeleted),
            (ChangeKind::Created, Topic::Dreams) => Some(EventType::DreamCreated),
            (ChangeKind::Modified, Topic::Dreams) => Some(EventType::DreamModified),
            (ChangeKind::Deleted, Topic::Dreams) => Some(EventType::DreamDeleted),
            (_, Topic::System) => None,
        }
    }

    /// Validate and transform a raw change. Returns `None` when the change
    /// should be dropped.
    pub fn normalize(&self, change: &RawChange) -> Option<DomainEvent> {
        let topic = match self.topic_for(&change.path) {
            Some(topic) => topic,
            None => {
                tracing::warn!(path = %change.path.display(), "event outside watched subtrees");
                return None;
            }
        };

        let event_type = Self::event_type_for(change.kind, topic)?;

        let filename = change.path.file_name()?.to_string_lossy();
        let slug = match extract_slug(&filename) {
            Some(slug) => slug.to_string(),
            None => {
                tracing::warn!(
                    filename = %filename,
                    path = %change.path.display(),
                    "event with invalid slug"
                );
                return None;
            }
        };

        Some(DomainEvent::new(
            event_type,
            topic,
            Some(filename.into_owned()),
            Some(slug),
        ))
    }
}
