//! FUSE integration for cbfs
//!
//! - `CbfsFs`: `fuser::Filesystem` implementation over the node tree
//! - `InodeTable`: inode ↔ path ↔ node mapping
//!
//! The adapter only translates: every decision about caching and remote
//! calls is made by the nodes.

mod cbfs_fs;
mod inode_table;

use std::path::Path;

use fuser::MountOption;

pub use cbfs_fs::{errno, CbfsFs};
pub use inode_table::InodeTable;

#[derive(Debug, thiserror::Error)]
pub enum MountError {
    #[error("mount point {0:?} does not exist")]
    MissingMountPoint(std::path::PathBuf),
    #[error("mount failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Mount `fs` at `mountpoint` and serve requests until unmounted.
pub fn mount(
    fs: CbfsFs,
    mountpoint: &Path,
    read_only: bool,
    allow_other: bool,
) -> Result<(), MountError> {
    if !mountpoint.is_dir() {
        return Err(MountError::MissingMountPoint(mountpoint.to_path_buf()));
    }

    let mut options = vec![
        MountOption::FSName("cbfs".into()),
        MountOption::Subtype("cbfs".into()),
        MountOption::NoExec,
    ];
    if read_only {
        options.push(MountOption::RO);
    }
    if allow_other {
        options.push(MountOption::AllowOther);
        options.push(MountOption::AutoUnmount);
    }

    tracing::info!("mounting cbfs at {:?} (read_only={})", mountpoint, read_only);
    fuser::mount2(fs, mountpoint, &options)?;
    tracing::info!("unmounted {:?}", mountpoint);
    Ok(())
}
