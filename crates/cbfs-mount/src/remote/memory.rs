//! In-memory store for exercising the node layer without a server.

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use reqwest::StatusCode;

use super::listing::{clean_path, DirEntry, DirectoryListing, FileEntry};
use super::{Blob, RemoteError, RemoteStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List(String),
    Get(String),
    Put { path: String, exclusive: bool },
    Delete(String),
}

#[derive(Debug, Default)]
struct Inner {
    blobs: BTreeMap<String, (Vec<u8>, SystemTime)>,
    /// Listed but with no retrievable content
    ghosts: BTreeMap<String, u64>,
    calls: Vec<Call>,
    offline: bool,
}

#[derive(Debug, Default)]
pub struct MemoryRemote {
    inner: Mutex<Inner>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: &str, data: &[u8]) -> Self {
        self.insert(path, data);
        self
    }

    pub fn insert(&self, path: &str, data: &[u8]) {
        let modified = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        self.inner
            .lock()
            .blobs
            .insert(clean_path(path), (data.to_vec(), modified));
    }

    pub fn insert_ghost(&self, path: &str, size: u64) {
        self.inner.lock().ghosts.insert(clean_path(path), size);
    }

    pub fn content(&self, path: &str) -> Option<Vec<u8>> {
        self.inner
            .lock()
            .blobs
            .get(&clean_path(path))
            .map(|(data, _)| data.clone())
    }

    /// Every subsequent call fails until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.inner.lock().offline = offline;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().calls.clear();
    }

    pub fn list_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::List(_)))
            .count()
    }

    fn record(&self, call: Call) -> Result<(), RemoteError> {
        let mut inner = self.inner.lock();
        inner.calls.push(call);
        if inner.offline {
            return Err(RemoteError::Status(StatusCode::SERVICE_UNAVAILABLE));
        }
        Ok(())
    }
}

impl RemoteStore for MemoryRemote {
    fn fetch_listing(&self, path: &str) -> Result<DirectoryListing, RemoteError> {
        self.record(Call::List(path.to_string()))?;

        let dir = clean_path(path);
        let prefix = if dir == "/" {
            "/".to_string()
        } else {
            format!("{}/", dir)
        };

        let inner = self.inner.lock();
        let mut listing = DirectoryListing::empty(&dir);
        let sized = inner
            .blobs
            .iter()
            .map(|(p, (data, modified))| (p, data.len() as u64, Some(*modified)))
            .chain(inner.ghosts.iter().map(|(p, size)| (p, *size, None)));

        for (p, size, modified) in sized {
            let Some(rest) = p.strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                None => {
                    listing.files.insert(
                        rest.to_string(),
                        FileEntry {
                            size,
                            modified: modified.map(Into::into),
                        },
                    );
                }
                Some((child, _)) => {
                    listing
                        .dirs
                        .entry(child.to_string())
                        .or_insert(DirEntry { size: 0 })
                        .size += size;
                }
            }
        }

        Ok(listing)
    }

    fn fetch_blob(&self, path: &str) -> Result<Blob, RemoteError> {
        self.record(Call::Get(path.to_string()))?;

        match self.inner.lock().blobs.get(&clean_path(path)) {
            Some((data, modified)) => Ok(Blob {
                data: data.clone(),
                modified: *modified,
            }),
            None => Err(RemoteError::NotFound(StatusCode::NOT_FOUND)),
        }
    }

    fn put_blob(
        &self,
        path: &str,
        data: Vec<u8>,
        if_none_match: bool,
    ) -> Result<(), RemoteError> {
        self.record(Call::Put {
            path: path.to_string(),
            exclusive: if_none_match,
        })?;

        let key = clean_path(path);
        let mut inner = self.inner.lock();
        if if_none_match && inner.blobs.contains_key(&key) {
            return Err(RemoteError::Conflict);
        }
        inner.ghosts.remove(&key);
        inner.blobs.insert(key, (data, SystemTime::now()));
        Ok(())
    }

    fn delete_blob(&self, path: &str) -> Result<(), RemoteError> {
        self.record(Call::Delete(path.to_string()))?;

        let key = clean_path(path);
        match self.inner.lock().blobs.remove(&key) {
            Some(_) => Ok(()),
            None => Err(RemoteError::Status(StatusCode::NOT_FOUND)),
        }
    }
}
