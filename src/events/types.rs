//! Domain event types for filesystem change distribution.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Filesystem change kind after reduction from raw watcher events.
///
/// Closed set: anything the OS reports that does not map onto one of these
/// is filtered out before it reaches the debouncer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

impl ChangeKind {
    /// Retention priority during debouncing. Higher wins when a burst of
    /// changes on one path is coalesced into a single event.
    pub fn priority(&self) -> u8 {
        match self {
            ChangeKind::Created => 3,
            ChangeKind::Deleted => 2,
            ChangeKind::Modified => 1,
        }
    }
}

/// A debounced filesystem change, ready for normalization.
#[derive(Debug, Clone)]
pub struct RawChange {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

/// Routing topic for domain events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    Thoughts,
    Dreams,
    System,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Thoughts => "thoughts",
            Topic::Dreams => "dreams",
            Topic::System => "system",
        }
    }
}

/// Subscription scope: a single topic or the wildcard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopicFilter {
    Topic(Topic),
    All,
}

impl TopicFilter {
    /// Parse a client-supplied topic string. Unrecognized values fall back
    /// to the wildcard rather than erroring.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "thoughts" => TopicFilter::Topic(Topic::Thoughts),
            "dreams" => TopicFilter::Topic(Topic::Dreams),
            "system" => TopicFilter::Topic(Topic::System),
            _ => TopicFilter::All,
        }
    }

    /// Whether events on `topic` are visible through this filter.
    pub fn matches(&self, topic: Topic) -> bool {
        match self {
            TopicFilter::All => true,
            TopicFilter::Topic(t) => *t == topic,
        }
    }
}

/// Domain event types carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventType {
    #[serde(rename = "thought.created")]
    ThoughtCreated,
    #[serde(rename = "thought.modified")]
    ThoughtModified,
    #[serde(rename = "thought.deleted")]
    ThoughtDeleted,
    #[serde(rename = "dream.created")]
    DreamCreated,
    #[serde(rename = "dream.modified")]
    DreamModified,
    #[serde(rename = "dream.deleted")]
    DreamDeleted,
    #[serde(rename = "heartbeat")]
    Heartbeat,
    #[serde(rename = "system.overload")]
    SystemOverload,
}

impl EventType {
    /// Wire name, used as the SSE event tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ThoughtCreated => "thought.created",
            EventType::ThoughtModified => "thought.modified",
            EventType::ThoughtDeleted => "thought.deleted",
            EventType::DreamCreated => "dream.created",
            EventType::DreamModified => "dream.modified",
            EventType::DreamDeleted => "dream.deleted",
            EventType::Heartbeat => "heartbeat",
            EventType::SystemOverload => "system.overload",
        }
    }

    /// What this event means for a consumer mirroring filesystem state.
    /// Heartbeats and overload notices carry no content change.
    pub fn change_action(&self) -> Option<ChangeAction> {
        match self {
            EventType::ThoughtCreated
            | EventType::ThoughtModified
            | EventType::DreamCreated
            | EventType::DreamModified => Some(ChangeAction::Upsert),
            EventType::ThoughtDeleted | EventType::DreamDeleted => Some(ChangeAction::Delete),
            EventType::Heartbeat | EventType::SystemOverload => None,
        }
    }
}

/// Content-level effect of a domain event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    Upsert,
    Delete,
}

/// Typed domain event for filesystem changes.
///
/// Immutable once constructed. Serialized to JSON for SSE delivery; never
/// persisted.
#[derive(Debug, Clone, Serialize)]
pub struct DomainEvent {
    /// Unique event identifier.
    pub id: Uuid,
    /// Event type indicating the action and content kind.
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Event timestamp (UTC).
    pub timestamp: DateTime<Utc>,
    /// Topic for subscriber routing.
    pub topic: Topic,
    /// File name within the content directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Slug extracted from the file name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
}

impl DomainEvent {
    pub fn new(
        event_type: EventType,
        topic: Topic,
        path: Option<String>,
        slug: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            timestamp: Utc::now(),
            topic,
            path,
            slug,
        }
    }

    /// Synthetic heartbeat on the system topic.
    pub fn heartbeat() -> Self {
        Self::new(EventType::Heartbeat, Topic::System, None, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serializes_with_wire_names() {
        let event = DomainEvent::new(
            EventType::ThoughtCreated,
            Topic::Thoughts,
            Some("morning.md".to_string()),
            Some("morning".to_string()),
        );
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&event).unwrap()).unwrap();

        assert_eq!(json["type"], "thought.created");
        assert_eq!(json["topic"], "thoughts");
        assert_eq!(json["slug"], "morning");
        assert!(json["id"].is_string());
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn heartbeat_omits_optional_fields() {
        let json = serde_json::to_string(&DomainEvent::heartbeat()).unwrap();
        assert!(json.contains(r#""type":"heartbeat""#));
        assert!(!json.contains("path"));
        assert!(!json.contains("slug"));
    }

    #[test]
    fn unknown_topic_falls_back_to_wildcard() {
        assert_eq!(TopicFilter::parse("dreams"), TopicFilter::Topic(Topic::Dreams));
        assert_eq!(TopicFilter::parse("everything"), TopicFilter::All);
        assert_eq!(TopicFilter::parse(""), TopicFilter::All);
    }

    #[test]
    fn created_outranks_deleted_outranks_modified() {
        assert!(ChangeKind::Created.priority() > ChangeKind::Deleted.priority());
        assert!(ChangeKind::Deleted.priority() > ChangeKind::Modified.priority());
    }

    #[test]
    fn heartbeat_has_no_change_action() {
        assert_eq!(EventType::Heartbeat.change_action(), None);
        assert_eq!(EventType::SystemOverload.change_action(), None);
        assert_eq!(
            EventType::DreamDeleted.change_action(),
            Some(ChangeAction::Delete)
        );
        assert_eq!(
            EventType::ThoughtModified.change_action(),
            Some(ChangeAction::Upsert)
        );
    }
}
