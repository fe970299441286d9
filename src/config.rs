//! Configuration for the content event and search service.
//!
//! Layered configuration: defaults, then an optional TOML file, then
//! environment variable overrides.
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `MIRADOR_` and use double
//! underscores to separate nested levels:
//! - `MIRADOR_EVENTS__DEBOUNCE_MS=100` sets `events.debounce_ms`
//! - `MIRADOR_CONTENT__THOUGHTS_DIR=/data/thoughts` sets `content.thoughts_dir`
//! - `MIRADOR_SERVER__BIND=0.0.0.0:8000` sets `server.bind`

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "mirador.toml";

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Settings {
    /// Content tree locations.
    #[serde(default)]
    pub content: ContentConfig,

    /// Event pipeline tuning.
    #[serde(default)]
    pub events: EventsConfig,

    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging levels.
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ContentConfig {
    /// Directory holding thought entries (`<slug>.md`).
    #[serde(default = "default_thoughts_dir")]
    pub thoughts_dir: PathBuf,

    /// Directory holding dream entries (`<slug>.md`).
    #[serde(default = "default_dreams_dir")]
    pub dreams_dir: PathBuf,
}

impl ContentConfig {
    /// The directories the filesystem watcher monitors.
    pub fn watch_paths(&self) -> Vec<PathBuf> {
        vec![self.thoughts_dir.clone(), self.dreams_dir.clone()]
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EventsConfig {
    /// Debounce window for filesystem events, in milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Maximum items per subscriber queue.
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,

    /// Maximum concurrent subscribers across all topics.
    #[serde(default = "default_max_subscribers")]
    pub max_subscribers: usize,

    /// Seconds between heartbeat frames on idle streams.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    /// Bind address for the HTTP server.
    #[serde(default = "default_bind")]
    pub bind: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default log level when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module level overrides, e.g. `mirador::events = "debug"`.
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

// Default value functions
fn default_thoughts_dir() -> PathBuf {
    PathBuf::from("content/thoughts")
}
fn default_dreams_dir() -> PathBuf {
    PathBuf::from("content/dreams")
}
fn default_debounce_ms() -> u64 {
    50
}
fn default_queue_size() -> usize {
    100
}
fn default_max_subscribers() -> usize {
    100
}
fn default_heartbeat_secs() -> u64 {
    15
}
fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            thoughts_dir: default_thoughts_dir(),
            dreams_dir: default_dreams_dir(),
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            queue_size: default_queue_size(),
            max_subscribers: default_max_subscribers(),
            heartbeat_secs: default_heartbeat_secs(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, Box<figment::Error>> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    /// Load configuration layering defaults, the given TOML file (if it
    /// exists), and `MIRADOR_` environment variables.
    pub fn load_from(config_path: &Path) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(config_path))
            // Double underscore separates nesting levels; single underscores
            // stay part of the field name.
            .merge(
                Env::prefixed("MIRADOR_")
                    .map(|key| key.as_str().to_lowercase().replace("__", ".").into()),
            )
            .extract()
            .map_err(Box::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_sane() {
        let settings = Settings::default();
        assert_eq!(settings.events.debounce_ms, 50);
        assert_eq!(settings.events.queue_size, 100);
        assert_eq!(settings.events.max_subscribers, 100);
        assert_eq!(settings.events.heartbeat_secs, 15);
        assert_eq!(settings.logging.default, "warn");
        assert_eq!(settings.content.watch_paths().len(), 2);
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mirador.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[events]\ndebounce_ms = 200\n\n[content]\nthoughts_dir = \"/srv/thoughts\"\n"
        )
        .unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.events.debounce_ms, 200);
        assert_eq!(
            settings.content.thoughts_dir,
            PathBuf::from("/srv/thoughts")
        );
        // Untouched sections keep their defaults
        assert_eq!(settings.events.queue_size, 100);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let settings = Settings::load_from(Path::new("/nonexistent/mirador.toml")).unwrap();
        assert_eq!(settings.events.queue_size, 100);
    }
}
