//! Mount configuration and entry point.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use fuser::MountOption;
use tracing::info;

use tapfs_core::SessionRegistry;

use crate::passthrough::TapFs;
use crate::FsError;

/// Mount configuration.
#[derive(Debug, Clone)]
pub struct MountConfig {
    /// The real directory all operations forward to.
    pub backing: PathBuf,
    /// Target of the `.tapfs` symlink: the RPC socket path.
    pub socket_target: PathBuf,
    /// Kernel attribute/entry TTL. Zero makes the kernel re-ask on every
    /// access, which is what `--debug` wants.
    pub attr_ttl: Duration,
}

impl MountConfig {
    /// Configuration with the default one-second TTL.
    pub fn new(backing: PathBuf, socket_target: PathBuf) -> Self {
        Self {
            backing,
            socket_target,
            attr_ttl: Duration::from_secs(1),
        }
    }
}

/// Mounts the pass-through filesystem and blocks until it is unmounted.
pub fn mount(
    config: MountConfig,
    registry: Arc<SessionRegistry>,
    mountpoint: &Path,
) -> Result<(), FsError> {
    if !config.backing.is_dir() {
        return Err(FsError::BadBacking(config.backing));
    }

    let options = vec![
        MountOption::RW,
        MountOption::FSName("tapfs".to_string()),
        MountOption::AutoUnmount,
    ];

    info!(
        mountpoint = %mountpoint.display(),
        backing = %config.backing.display(),
        "mounting"
    );
    let fs = TapFs::new(config, registry);
    fuser::mount2(fs, mountpoint, &options)?;
    Ok(())
}
