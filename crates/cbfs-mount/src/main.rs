use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;

use cbfs_mount::fuse::{self, CbfsFs};
use cbfs_mount::{CbfsRoot, Cli, Context, HttpRemote};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = Cli::parse().into_config()?;
    let settings = config.settings();
    tracing::info!(
        "cbfs root {} -> {:?} (write={}, stale_after={:?})",
        config.root,
        config.mount_point,
        settings.write_enabled,
        settings.stale_after
    );

    let remote = HttpRemote::with_timeout(&config.root, config.request_timeout())
        .context("building HTTP client")?;
    let root = CbfsRoot::new(Context::new(Arc::new(remote), settings));
    let fs = CbfsFs::new(&root).context("fetching root listing")?;

    fuse::mount(
        fs,
        &config.mount_point,
        !root.context().settings().write_enabled,
        config.allow_other,
    )?;
    Ok(())
}
