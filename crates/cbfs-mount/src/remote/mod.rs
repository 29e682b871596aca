//! Client side of the cbfs HTTP contract
//!
//! - `GET  {root}/.cbfs/list{path}/?includeMeta=true` - directory listing
//! - `GET  {root}{path}` - blob content plus `Last-Modified`
//! - `PUT  {root}{path}` - store a blob (201), optionally `If-None-Match: *`
//! - `DELETE {root}{path}` - remove a blob (204)
//!
//! The node layer talks to the store through [`RemoteStore`] so that it can
//! be driven without a live server.

mod client;
mod error;
mod listing;
#[cfg(test)]
pub(crate) mod memory;

use std::time::SystemTime;

pub use client::HttpRemote;
pub use error::RemoteError;
pub use listing::{clean_path, join_path, split_path, DirEntry, DirectoryListing, FileEntry};

/// Blob content as fetched from the store.
#[derive(Debug, Clone)]
pub struct Blob {
    pub data: Vec<u8>,
    /// Unix epoch when the store sent no usable `Last-Modified`
    pub modified: SystemTime,
}

/// Stateless operations against the remote store.
pub trait RemoteStore: Send + Sync + std::fmt::Debug {
    /// Fetch the listing for a directory path. An empty response body is a
    /// valid, empty directory.
    fn fetch_listing(&self, path: &str) -> Result<DirectoryListing, RemoteError>;

    /// Fetch a blob. Any non-success status is [`RemoteError::NotFound`].
    fn fetch_blob(&self, path: &str) -> Result<Blob, RemoteError>;

    /// Store a blob. With `if_none_match` the store must reject the write
    /// when something already lives at `path`.
    fn put_blob(&self, path: &str, data: Vec<u8>, if_none_match: bool)
        -> Result<(), RemoteError>;

    fn delete_blob(&self, path: &str) -> Result<(), RemoteError>;
}
