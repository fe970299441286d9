//! Event pipeline: filesystem changes in, domain events out.
//!
//! # Architecture
//!
//! ```text
//! notify thread -> debounce thread -> bounded handoff -> normalizer
//!                                                            |
//!                                                      EventBus.publish
//!                                                       /           \
//!                                           BroadcastHub           search
//!                                          (client streams)      subscriber
//! ```

pub mod bus;
pub mod hub;
pub mod normalizer;
pub mod types;
pub mod watcher;

pub use bus::{EventBus, SubscribeError, Subscription};
pub use hub::{BroadcastHub, Frame, FrameStream};
pub use normalizer::EventNormalizer;
pub use types::{ChangeAction, ChangeKind, DomainEvent, EventType, RawChange, Topic, TopicFilter};
pub use watcher::{ContentWatcher, WatchError};
