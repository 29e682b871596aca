use crate::remote::RemoteError;

/// Failure of a node operation, as seen by the filesystem transport.
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("no such entry: {path}")]
    NotFound { path: String },
    #[error("{op}: write support is disabled")]
    NotPermitted { op: &'static str },
    #[error("{op}({path:?}): {source}")]
    Remote {
        op: &'static str,
        path: String,
        #[source]
        source: RemoteError,
    },
    #[error("{op}({path:?}): not supported")]
    Unsupported { op: &'static str, path: String },
    #[error("{op}({path:?}): no longer present in its directory")]
    Vanished { op: &'static str, path: String },
    #[error("{op}({path:?}): {size} bytes exceeds the file size limit")]
    TooLarge {
        op: &'static str,
        path: String,
        size: u64,
    },
    #[error("{op}: invalid name {name:?}")]
    InvalidName { op: &'static str, name: String },
    #[error("{op}({path:?}): expected a file, found a directory")]
    NotAFile { op: &'static str, path: String },
}

impl FsError {
    /// Wrap a store failure. Every such failure is logged here.
    pub(crate) fn remote(op: &'static str, path: &str, source: RemoteError) -> Self {
        tracing::warn!("{}({:?}) => {}", op, path, source);
        FsError::Remote {
            op,
            path: path.to_string(),
            source,
        }
    }

    pub(crate) fn not_found(path: &str) -> Self {
        FsError::NotFound {
            path: path.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FsError::NotFound { .. })
    }

    pub fn is_not_permitted(&self) -> bool {
        matches!(self, FsError::NotPermitted { .. })
    }
}

pub type FsResult<T> = Result<T, FsError>;
