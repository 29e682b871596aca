use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;

use super::dir::DirNode;
use super::error::{FsError, FsResult};
use super::freshness::Freshness;
use super::{Attributes, Context, Node, NodeKind, MAX_FILE_SIZE};
use crate::remote::split_path;

#[derive(Debug, Clone)]
struct FileState {
    content: Arc<Vec<u8>>,
    modified: SystemTime,
    freshness: Freshness,
}

/// A blob on the remote store, held entirely in memory.
#[derive(Debug)]
pub struct FileNode {
    ctx: Arc<Context>,
    path: String,
    state: Mutex<FileState>,
}

impl FileNode {
    pub(crate) fn new(ctx: Arc<Context>, path: String, data: Vec<u8>, modified: SystemTime) -> Self {
        Self {
            ctx,
            path,
            state: Mutex::new(FileState {
                content: Arc::new(data),
                modified,
                freshness: Freshness::now(),
            }),
        }
    }

    pub(crate) fn empty(ctx: Arc<Context>, path: String) -> Self {
        Self::new(ctx, path, Vec::new(), SystemTime::UNIX_EPOCH)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn attributes(&self) -> Attributes {
        let state = self.state.lock();
        Attributes {
            kind: NodeKind::File,
            perm: 0o644,
            size: state.content.len() as u64,
            mtime: state.modified,
        }
    }

    /// Re-resolve this file through its parent when the cache is stale. On
    /// any failure the cached state is left as it was.
    fn revalidate(&self, state: &mut FileState, op: &'static str) -> FsResult<()> {
        if !state.freshness.is_stale(self.ctx.settings().stale_after) {
            return Ok(());
        }

        let (parent, name) = split_path(&self.path);
        let dir = DirNode::fetch(&self.ctx, &parent)?;
        match dir.lookup(&name) {
            Ok(Node::File(fresh)) => {
                *state = fresh.state.lock().clone();
                Ok(())
            }
            Ok(Node::Dir(_)) => Err(FsError::NotAFile {
                op,
                path: self.path.clone(),
            }),
            Err(FsError::NotFound { path }) => {
                tracing::warn!("{}({:?}) => no longer exists", op, path);
                Err(FsError::Vanished { op, path })
            }
            Err(e) => Err(e),
        }
    }

    /// The whole content, revalidated if stale.
    pub fn read(&self) -> FsResult<Arc<Vec<u8>>> {
        let mut state = self.state.lock();
        self.revalidate(&mut state, "read")?;
        Ok(state.content.clone())
    }

    /// Splice `data` into the latest content at `offset` and store the
    /// result. Returns the number of bytes accepted.
    pub fn write(&self, offset: usize, data: &[u8]) -> FsResult<usize> {
        self.ctx.ensure_writable("write")?;
        let end = offset.checked_add(data.len()).unwrap_or(usize::MAX);
        self.check_size("write", end)?;

        let mut state = self.state.lock();
        state.freshness.invalidate();
        self.revalidate(&mut state, "write")?;

        let content =
            splice(&state.content, offset, data).ok_or_else(|| self.too_large("write", end))?;
        self.store(&mut state, "write", content)?;
        Ok(data.len())
    }

    /// Truncate or zero-extend to exactly `size` bytes.
    pub fn set_size(&self, size: u64) -> FsResult<()> {
        self.ctx.ensure_writable("setattr")?;
        let size = usize::try_from(size).unwrap_or(usize::MAX);
        self.check_size("setattr", size)?;

        let mut state = self.state.lock();
        state.freshness.invalidate();
        self.revalidate(&mut state, "setattr")?;

        let mut content = state.content.to_vec();
        if size > content.len() {
            content
                .try_reserve_exact(size - content.len())
                .map_err(|_| self.too_large("setattr", size))?;
        }
        content.resize(size, 0);
        self.store(&mut state, "setattr", content)
    }

    /// Replace the whole content.
    pub fn write_all(&self, content: Vec<u8>) -> FsResult<()> {
        self.ctx.ensure_writable("write")?;

        let mut state = self.state.lock();
        self.revalidate(&mut state, "write")?;
        self.store(&mut state, "write", content)
    }

    /// Reject a resulting length past [`MAX_FILE_SIZE`] before any request
    /// is made.
    fn check_size(&self, op: &'static str, size: usize) -> FsResult<()> {
        if size > MAX_FILE_SIZE {
            return Err(self.too_large(op, size));
        }
        Ok(())
    }

    fn too_large(&self, op: &'static str, size: usize) -> FsError {
        tracing::warn!("{}({:?}) => {} bytes is too large", op, self.path, size);
        FsError::TooLarge {
            op,
            path: self.path.clone(),
            size: size as u64,
        }
    }

    fn store(&self, state: &mut FileState, op: &'static str, content: Vec<u8>) -> FsResult<()> {
        let content = Arc::new(content);
        self.ctx
            .remote()
            .put_blob(&self.path, content.to_vec(), false)
            .map_err(|e| FsError::remote(op, &self.path, e))?;

        let mut freshness = Freshness::now();
        freshness.invalidate();
        *state = FileState {
            content,
            modified: SystemTime::now(),
            freshness,
        };
        Ok(())
    }

    pub fn flush(&self) -> FsResult<()> {
        self.ctx.ensure_writable("flush")
    }

    /// Writes are already synchronous; this only checks the file is still
    /// there.
    pub fn sync(&self) -> FsResult<()> {
        let mut state = self.state.lock();
        state.freshness.invalidate();
        self.revalidate(&mut state, "fsync")
    }
}

/// Write `data` over `content` starting at `offset`, zero-filling any gap.
/// `None` when the result cannot be allocated.
pub(crate) fn splice(content: &[u8], offset: usize, data: &[u8]) -> Option<Vec<u8>> {
    let end = offset.checked_add(data.len())?;

    let mut out = Vec::new();
    out.try_reserve_exact(end.max(content.len())).ok()?;
    out.extend_from_slice(content);
    if offset > out.len() {
        out.resize(offset, 0);
    }

    if end <= out.len() {
        out[offset..end].copy_from_slice(data);
    } else {
        out.truncate(offset);
        out.extend_from_slice(data);
    }
    Some(out)
}
