//! Settings file for the `booksync` binary.
//!
//! ```toml
//! remote_url = "https://books.example.com/api"
//! store_path = "books.json"
//! request_timeout_secs = 10
//! network_threads = 2
//! storage_threads = 1
//! log_level = "info"
//! log_format = "text"
//! ```
//!
//! Every key is optional. Command-line flags (and their env vars) win over
//! the file, the file wins over the defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("no {0} configured (pass a flag, set the env var, or add it to the config file)")]
    Missing(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub remote_url: Option<String>,
    pub store_path: Option<PathBuf>,
    pub request_timeout_secs: u64,
    pub network_threads: usize,
    pub storage_threads: usize,
    pub log_level: String,
    pub log_format: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            remote_url: None,
            store_path: None,
            request_timeout_secs: 10,
            network_threads: 2,
            storage_threads: 1,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
        }
    }
}

/// Values given on the command line; `None` means "not given".
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub remote_url: Option<String>,
    pub store_path: Option<PathBuf>,
    pub log_level: Option<String>,
    pub log_format: Option<String>,
}

impl Settings {
    pub fn from_toml(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read `path` if given, otherwise start from defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content, path)
    }

    pub fn apply(mut self, overrides: Overrides) -> Self {
        if let Some(url) = overrides.remote_url {
            self.remote_url = Some(url);
        }
        if let Some(path) = overrides.store_path {
            self.store_path = Some(path);
        }
        if let Some(level) = overrides.log_level {
            self.log_level = level;
        }
        if let Some(format) = overrides.log_format {
            self.log_format = format;
        }
        self
    }

    pub fn remote_url(&self) -> Result<&str, ConfigError> {
        self.remote_url
            .as_deref()
            .ok_or(ConfigError::Missing("remote URL"))
    }

    pub fn store_path(&self) -> Result<&Path, ConfigError> {
        self.store_path
            .as_deref()
            .ok_or(ConfigError::Missing("store path"))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}
