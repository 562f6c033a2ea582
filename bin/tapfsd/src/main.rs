//! tapfs server - mounts the pass-through tracing filesystem and serves
//! the session RPC.
//!
//! Commands run through the mount are attributed by process group; the
//! wrapper (`tapfs`) opens and closes sessions over the Unix socket that
//! the mount-root `.tapfs` symlink points at.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use tapfs_core::SessionRegistry;
use tapfs_fs::{mount, MountConfig};

/// Pass-through filesystem server attributing file I/O to traced commands.
#[derive(Parser)]
#[command(name = "tapfsd")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Where to mount the overlay
    mountpoint: PathBuf,

    /// The real directory all operations forward to
    #[arg(long)]
    backing: PathBuf,

    /// Directory dependency records are written into
    #[arg(long)]
    depdir: PathBuf,

    /// Verbose callback logging and zero kernel cache timeouts
    #[arg(long)]
    debug: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set up logging")?;

    let backing = cli
        .backing
        .canonicalize()
        .with_context(|| format!("backing dir {:?}", cli.backing))?;
    let depdir = cli
        .depdir
        .canonicalize()
        .with_context(|| format!("dep dir {:?}", cli.depdir))?;

    let registry = Arc::new(SessionRegistry::new());
    let server =
        tapfs_rpc::serve(registry.clone(), depdir).context("Failed to start session server")?;
    info!(socket = %server.socket_path().display(), "session server up");

    let attr_ttl = if cli.debug {
        Duration::ZERO
    } else {
        Duration::from_secs(1)
    };
    let config = MountConfig {
        backing,
        socket_target: server.socket_path().to_path_buf(),
        attr_ttl,
    };

    // Blocks until the kernel unmounts us.
    mount(config, registry, &cli.mountpoint)
        .with_context(|| format!("mount at {:?}", cli.mountpoint))?;

    info!("unmounted, shutting down");
    Ok(())
}
