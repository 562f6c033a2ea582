//! In-process session server harness.

use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use tapfs_core::SessionRegistry;
use tapfs_proto::SOCKET_NAME;
use tapfs_rpc::{RpcClient, RpcError, ServerHandle};

/// A convenient boxed error for test setup.
pub type SetupError = Box<dyn std::error::Error + Send + Sync>;

/// A running session server plus the directories a mount would own: a
/// dependency directory for records and a fake mount root carrying the
/// `.tapfs` discovery symlink.
pub struct TestServer {
    /// The shared attribution registry, for injecting recorded operations.
    pub registry: Arc<SessionRegistry>,
    handle: ServerHandle,
    dep_dir: TempDir,
    mount_root: TempDir,
}

impl TestServer {
    /// Starts a server on a fresh socket.
    pub fn start() -> Result<Self, SetupError> {
        let registry = Arc::new(SessionRegistry::new());
        let dep_dir = tempfile::tempdir()?;
        let handle = tapfs_rpc::serve(registry.clone(), dep_dir.path().to_path_buf())?;

        let mount_root = tempfile::tempdir()?;
        std::os::unix::fs::symlink(handle.socket_path(), mount_root.path().join(SOCKET_NAME))?;

        Ok(Self {
            registry,
            handle,
            dep_dir,
            mount_root,
        })
    }

    /// The server socket path.
    pub fn socket_path(&self) -> &Path {
        self.handle.socket_path()
    }

    /// Where records land.
    pub fn dep_dir(&self) -> &Path {
        self.dep_dir.path()
    }

    /// A directory that looks like a mount root: it contains the `.tapfs`
    /// symlink pointing at the live socket.
    pub fn mount_root(&self) -> &Path {
        self.mount_root.path()
    }

    /// Dials a fresh client connection.
    pub fn client(&self) -> Result<RpcClient, RpcError> {
        RpcClient::dial(self.socket_path())
    }
}
