//! Mount configuration loaded from a TOML file
//!
//! Every field has a default, so an empty file (or no file) is valid.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::node::{Settings, WRITE_ENABLED};

pub const DEFAULT_MOUNT_POINT: &str = "/mnt/cbfs";
pub const DEFAULT_ROOT: &str = "http://cbfs:8484/";
pub const DEFAULT_STALE_AFTER_SECS: u64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where the filesystem is mounted
    pub mount_point: PathBuf,
    /// Base URL of the cbfs server
    pub root: Url,
    /// Seconds before cached listings and blobs are refetched
    pub stale_after_secs: u64,
    /// Per-request HTTP timeout; unset uses the client default
    pub request_timeout_secs: Option<u64>,
    /// Let users other than the mounting one access the tree
    pub allow_other: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mount_point: PathBuf::from(DEFAULT_MOUNT_POINT),
            root: Url::parse(DEFAULT_ROOT).expect("default root URL is valid"),
            stale_after_secs: DEFAULT_STALE_AFTER_SECS,
            request_timeout_secs: None,
            allow_other: false,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Node behavior derived from this config. Write support is fixed at
    /// build time.
    pub fn settings(&self) -> Settings {
        Settings {
            write_enabled: WRITE_ENABLED,
            stale_after: Duration::from_secs(self.stale_after_secs),
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}
