pub mod config;
pub mod content;
pub mod events;
#[cfg(feature = "http-server")]
pub mod http;
pub mod logging;
pub mod search;

pub use config::Settings;
pub use events::{
    BroadcastHub, ContentWatcher, DomainEvent, EventBus, EventNormalizer, EventType, Topic,
    TopicFilter,
};
pub use search::{ContentType, SearchIndex, SearchResponse};
