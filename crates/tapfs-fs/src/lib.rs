//! tapfs filesystem - a pass-through FUSE overlay that attributes
//! mutations to traced commands.
//!
//! The filesystem forwards every operation to a backing directory and, when
//! the forwarded call succeeds, reports the operation to the attribution
//! engine keyed by the calling process group. One synthetic entry exists at
//! the mount root: the reserved `.tapfs` symlink pointing at the session
//! RPC socket.

#![warn(missing_docs, rust_2018_idioms)]

pub mod attr;
pub mod inode;
pub mod mount;
pub mod passthrough;
mod sys;

pub use inode::{InodeTable, ROOT_INO, SOCKET_INO};
pub use mount::{mount, MountConfig};
pub use passthrough::TapFs;
pub use tapfs_proto::SOCKET_NAME;

use std::path::PathBuf;

use thiserror::Error;

/// Filesystem setup errors.
#[derive(Debug, Error)]
pub enum FsError {
    /// The backing path is missing or not a directory.
    #[error("backing directory {0:?} is not a directory")]
    BadBacking(PathBuf),

    /// The kernel mount itself failed.
    #[error("mount failed: {0}")]
    Mount(#[from] std::io::Error),
}
