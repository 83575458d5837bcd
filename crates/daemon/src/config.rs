//! Daemon configuration
//!
//! Loaded from a TOML file; every field has a default so an empty file (or
//! no file at all) is a valid configuration. CLI flags override file values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use common::{DEFAULT_CAPACITY_BYTES, DEFAULT_MAX_NODES};

use crate::mount::SessionOptions;

pub const CONFIG_FILE_NAME: &str = "config.toml";

/// What `add_file` / `add_directory` do when the parent directory is missing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParentPolicy {
    /// Fail with `NotFound`
    #[default]
    RequireExisting,
    /// Create the missing directories, each with its own event
    CreateMissing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Total bytes of file content the filesystem may hold
    pub capacity_bytes: u64,
    /// Maximum number of files and directories, root included
    pub max_nodes: u64,
    pub parent_policy: ParentPolicy,
    /// How long the kernel may cache attributes and lookups
    pub attr_ttl_ms: u64,
    /// Name reported to the kernel (shown by `mount` and `df`)
    pub fs_name: String,
    pub auto_unmount: bool,
    pub allow_other: bool,
    /// How long unmount waits for in-flight kernel requests
    pub drain_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capacity_bytes: DEFAULT_CAPACITY_BYTES,
            max_nodes: DEFAULT_MAX_NODES,
            parent_policy: ParentPolicy::default(),
            attr_ttl_ms: 1000,
            fs_name: "memfs".to_string(),
            auto_unmount: true,
            allow_other: false,
            drain_timeout_ms: 5000,
        }
    }
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&raw)?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Load `path` if given, else the default location if it exists, else defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Platform config location, e.g. `~/.config/memfs/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("rs", "memfs", "memfs")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn attr_ttl(&self) -> Duration {
        Duration::from_millis(self.attr_ttl_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            fs_name: self.fs_name.clone(),
            attr_ttl: self.attr_ttl(),
            auto_unmount: self.auto_unmount,
            allow_other: self.allow_other,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(Config::from_toml_str("").unwrap(), Config::default());
    }

    #[test]
    fn test_partial_override() {
        let config = Config::from_toml_str(
            r#"
            capacity_bytes = 104857600
            parent_policy = "create_missing"
            attr_ttl_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.capacity_bytes, 100 * 1024 * 1024);
        assert_eq!(config.parent_policy, ParentPolicy::CreateMissing);
        assert_eq!(config.attr_ttl(), Duration::from_millis(250));
        assert_eq!(config.fs_name, "memfs");
        assert_eq!(config.max_nodes, DEFAULT_MAX_NODES);
    }

    #[test]
    fn test_unknown_policy_is_rejected() {
        assert!(matches!(
            Config::from_toml_str(r#"parent_policy = "guess""#),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_round_trip_through_toml() {
        let config = Config {
            allow_other: true,
            ..Config::default()
        };
        let rendered = config.to_toml_string().unwrap();
        assert_eq!(Config::from_toml_str(&rendered).unwrap(), config);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "fs_name = \"scratch\"\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.fs_name, "scratch");

        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            Config::from_file(&missing),
            Err(ConfigError::Io { .. })
        ));
    }
}
