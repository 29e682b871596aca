// Store access and the cached node tree
pub mod node;
pub mod remote;

// Startup: flags and config file
pub mod cli;
pub mod config;

#[cfg(feature = "fuse")]
pub mod fuse;

pub use cli::Cli;
pub use config::{Config, ConfigError};
pub use node::{CbfsRoot, Context, DirNode, FileNode, FsError, FsResult, Node, Settings};
pub use remote::{HttpRemote, RemoteError, RemoteStore};
