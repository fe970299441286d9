//! Full-text search: tantivy index plus the bus subscriber that keeps it
//! consistent with the filesystem.

pub mod index;
pub mod subscriber;

pub use index::{ContentType, SearchError, SearchIndex, SearchResponse, SearchResult};
pub use subscriber::run_search_subscriber;
