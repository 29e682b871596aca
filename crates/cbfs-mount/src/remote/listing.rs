//! Wire types for the `/.cbfs/list` endpoint.

use std::collections::BTreeMap;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DefaultOnError, DefaultOnNull};

/// A directory listing as returned with `includeMeta=true`.
///
/// The server encodes absent maps as `null`; both decode as empty.
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectoryListing {
    #[serde(default)]
    pub path: String,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub files: BTreeMap<String, FileEntry>,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub dirs: BTreeMap<String, DirEntry>,
}

#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    #[serde(rename = "length", default)]
    pub size: u64,
    /// Unknown when missing or unparsable
    #[serde_as(as = "DefaultOnError")]
    #[serde(default)]
    pub modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirEntry {
    #[serde(default)]
    pub size: u64,
}

impl DirectoryListing {
    /// Listing for a directory the server has nothing to say about yet.
    pub fn empty(path: &str) -> Self {
        Self {
            path: clean_path(path),
            ..Default::default()
        }
    }

    /// Sum of all file sizes plus all subdirectory sizes.
    pub fn aggregate_size(&self) -> u64 {
        let files = self
            .files
            .values()
            .fold(0u64, |acc, f| acc.saturating_add(f.size));
        self.dirs
            .values()
            .fold(files, |acc, d| acc.saturating_add(d.size))
    }
}

impl FileEntry {
    pub fn modified_time(&self) -> SystemTime {
        self.modified.map(SystemTime::from).unwrap_or(SystemTime::UNIX_EPOCH)
    }
}

/// Lexically clean a slash-separated path: collapse repeated slashes, drop
/// `.` segments, resolve `..`, keep it rooted, no trailing slash.
pub fn clean_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            seg => parts.push(seg),
        }
    }
    format!("/{}", parts.join("/"))
}

/// Join a directory path and a child name into a clean path.
pub fn join_path(dir: &str, name: &str) -> String {
    clean_path(&format!("{}/{}", dir, name))
}

/// Split a clean path into its parent directory and base name.
pub fn split_path(path: &str) -> (String, String) {
    let cleaned = clean_path(path);
    match cleaned.rfind('/') {
        Some(0) => ("/".to_string(), cleaned[1..].to_string()),
        Some(pos) => (cleaned[..pos].to_string(), cleaned[pos + 1..].to_string()),
        None => ("/".to_string(), cleaned),
    }
}
