use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;

use crate::cache::DEFAULT_CACHE_CAPACITY;
use crate::{ConfigError, ZoomLevel};

/// Settings read from `config.toml`. Every key is optional.
///
/// ```toml
/// default_scale = 150
/// remember_position = false
/// fetch_timeout = 10
/// ```
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ViewerConfig {
    /// Zoom a document opens at when nothing was persisted for it.
    pub default_scale: ZoomLevel,
    /// Save and restore the inline page, zoom and rotation per document.
    pub remember_position: bool,
    /// Upper bound for fetching a remote document.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub fetch_timeout: Duration,
    /// Frames kept per open document.
    pub cache_capacity: usize,
    /// Used when `RUST_LOG` is not set.
    pub log_level: String,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            default_scale: ZoomLevel::Actual,
            remember_position: true,
            fetch_timeout: Duration::from_secs(30),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            log_level: "info".to_owned(),
        }
    }
}

impl ViewerConfig {
    /// Reads `path`, falling back to the defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(?path, "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Self::parse(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = ViewerConfig::load(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, ViewerConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "default_scale = 150\nfetch_timeout = 5\n").unwrap();

        let config = ViewerConfig::load(&path).unwrap();
        assert_eq!(config.default_scale, ZoomLevel::OneAndHalf);
        assert_eq!(config.fetch_timeout, Duration::from_secs(5));
        assert!(config.remember_position);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn scale_outside_menu_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "default_scale = 125\n").unwrap();

        match ViewerConfig::load(&path) {
            Err(ConfigError::Parse { source, .. }) => {
                assert!(source.to_string().contains("unsupported zoom level 125%"))
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(ViewerConfig::parse("dark_mode = true").is_err());
    }
}
