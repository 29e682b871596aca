use std::path::PathBuf;

use clap::Parser;
use url::Url;

use crate::config::{Config, ConfigError};

/// Mount a cbfs content store as a local filesystem.
#[derive(Parser, Debug, Clone)]
#[command(name = "cbfs-mount", version, about)]
pub struct Cli {
    /// Mount point
    #[arg(long = "mnt", env = "CBFS_MNT")]
    pub mount_point: Option<PathBuf>,

    /// Base URL of the cbfs server
    #[arg(long, env = "CBFS_ROOT")]
    pub root: Option<Url>,

    /// TOML config file; flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Seconds before cached state is refetched
    #[arg(long)]
    pub stale_after_secs: Option<u64>,

    /// Allow other users to access the mount
    #[arg(long)]
    pub allow_other: bool,
}

impl Cli {
    /// Defaults, then the config file if given, then flags.
    pub fn into_config(self) -> Result<Config, ConfigError> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };

        if let Some(mount_point) = self.mount_point {
            config.mount_point = mount_point;
        }
        if let Some(root) = self.root {
            config.root = root;
        }
        if let Some(secs) = self.stale_after_secs {
            config.stale_after_secs = secs;
        }
        if self.allow_other {
            config.allow_other = true;
        }

        Ok(config)
    }
}
