//! Frontmatter parsing and content file loading.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use thiserror::Error;

static FRONTMATTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\A---\s*\n(.*?)\n---\s*\n(.*)\z").expect("frontmatter pattern is valid")
});

/// Errors from loading a content file.
#[derive(Error, Debug)]
pub enum ContentError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("missing frontmatter block in {path}")]
    MissingFrontmatter { path: PathBuf },

    #[error("invalid frontmatter in {path}: {source}")]
    InvalidFrontmatter {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// A parsed content file: validated frontmatter plus the raw markdown body.
#[derive(Debug, Clone)]
pub struct Parsed<M> {
    pub meta: M,
    pub body: String,
}

/// Split a raw file into its YAML frontmatter and markdown body.
///
/// Returns `None` when the file does not open with a `---` delimited block.
pub fn split_frontmatter(raw: &str) -> Option<(&str, &str)> {
    let caps = FRONTMATTER.captures(raw)?;
    // Capture groups 1 and 2 always exist when the pattern matches.
    Some((
        caps.get(1).map(|m| m.as_str())?,
        caps.get(2).map(|m| m.as_str())?,
    ))
}

/// Read and parse a content file, validating frontmatter against `M`.
pub fn read_content<M: DeserializeOwned>(path: &Path) -> Result<Parsed<M>, ContentError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ContentError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let (frontmatter, body) =
        split_frontmatter(&raw).ok_or_else(|| ContentError::MissingFrontmatter {
            path: path.to_path_buf(),
        })?;

    let meta =
        serde_yaml::from_str(frontmatter).map_err(|source| ContentError::InvalidFrontmatter {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(Parsed {
        meta,
        body: body.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ThoughtMeta;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn splits_frontmatter_and_body() {
        let raw = "---\ntitle: Hi\n---\nBody text\nmore\n";
        let (fm, body) = split_frontmatter(raw).unwrap();
        assert_eq!(fm, "title: Hi");
        assert_eq!(body, "Body text\nmore\n");
    }

    #[test]
    fn no_delimiters_means_no_frontmatter() {
        assert!(split_frontmatter("just a file\n").is_none());
        assert!(split_frontmatter("--- not at start\n---\n").is_none());
    }

    #[test]
    fn read_content_validates_meta() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "entry.md",
            "---\ndate: \"2026-02-01\"\ntitle: A thought\nmood: calm\n---\n# Heading\ntext\n",
        );

        let parsed: Parsed<ThoughtMeta> = read_content(&path).unwrap();
        assert_eq!(parsed.meta.title, "A thought");
        assert_eq!(parsed.meta.mood.as_deref(), Some("calm"));
        assert!(parsed.body.contains("# Heading"));
    }

    #[test]
    fn read_content_rejects_bad_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "bad.md", "---\ntitle: [unclosed\n---\nbody\n");

        let err = read_content::<ThoughtMeta>(&path).unwrap_err();
        assert!(matches!(err, ContentError::InvalidFrontmatter { .. }));
    }

    #[test]
    fn read_content_requires_frontmatter() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "plain.md", "no frontmatter here\n");

        let err = read_content::<ThoughtMeta>(&path).unwrap_err();
        assert!(matches!(err, ContentError::MissingFrontmatter { .. }));
    }
}
