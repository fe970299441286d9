//! Content loading: frontmatter parsing and per-kind metadata schemas.

mod loader;
mod schema;

pub use loader::{ContentError, Parsed, read_content, split_frontmatter};
pub use schema::{DreamMeta, DreamType, ThoughtMeta};
