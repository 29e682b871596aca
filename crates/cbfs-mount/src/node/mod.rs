//! Cached directory and file nodes backed by the remote store
//!
//! # Architecture
//!
//! - `DirNode`: a cached listing with its aggregate size
//! - `FileNode`: a cached blob with its modification time
//! - `CbfsRoot`: hands out the root `DirNode`
//!
//! Each node keeps its cached fields behind one mutex and replaces them all
//! at once on refresh. A node is refreshed before serving a read-type
//! operation when it has been invalidated or when `stale_after` has passed
//! since the last fetch.

mod dir;
mod error;
mod file;
mod freshness;
mod root;

use std::sync::Arc;
use std::time::{Duration, SystemTime};

pub use dir::{CreateFlags, DirNode, Entry};
pub use error::{FsError, FsResult};
pub use file::FileNode;
pub use root::CbfsRoot;

use crate::remote::RemoteStore;

/// Whether this build accepts write-path operations.
pub const WRITE_ENABLED: bool = cfg!(feature = "write");

/// Default interval after which cached state is refetched.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(60);

/// Largest file a write or truncate may produce. Content is held whole in
/// memory and sent in one request.
pub const MAX_FILE_SIZE: usize = 1 << 30;

#[derive(Debug, Clone)]
pub struct Settings {
    pub write_enabled: bool,
    pub stale_after: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            write_enabled: WRITE_ENABLED,
            stale_after: DEFAULT_STALE_AFTER,
        }
    }
}

/// Shared by every node: where to send requests and how to behave.
#[derive(Debug)]
pub struct Context {
    remote: Arc<dyn RemoteStore>,
    settings: Settings,
}

impl Context {
    pub fn new(remote: Arc<dyn RemoteStore>, settings: Settings) -> Self {
        Self { remote, settings }
    }

    pub fn remote(&self) -> &dyn RemoteStore {
        self.remote.as_ref()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Reject a write-path operation before it reaches the network.
    pub(crate) fn ensure_writable(&self, op: &'static str) -> FsResult<()> {
        if self.settings.write_enabled {
            Ok(())
        } else {
            tracing::debug!("{} rejected: read-only mount", op);
            Err(FsError::NotPermitted { op })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Directory,
}

/// What a node reports to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attributes {
    pub kind: NodeKind,
    pub perm: u16,
    pub size: u64,
    pub mtime: SystemTime,
}

/// Result of resolving a name inside a directory.
#[derive(Debug, Clone)]
pub enum Node {
    File(Arc<FileNode>),
    Dir(Arc<DirNode>),
}

impl Node {
    pub fn path(&self) -> &str {
        match self {
            Node::File(f) => f.path(),
            Node::Dir(d) => d.path(),
        }
    }

    pub fn attributes(&self) -> FsResult<Attributes> {
        match self {
            Node::File(f) => Ok(f.attributes()),
            Node::Dir(d) => d.attributes(),
        }
    }
}
