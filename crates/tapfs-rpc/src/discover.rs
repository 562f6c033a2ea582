//! Socket discovery via the reserved mount-root symlink.

use std::fs;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use tapfs_proto::SOCKET_NAME;

/// Discovery failure.
#[derive(Debug, Error)]
pub enum DiscoverError {
    /// No usable `.tapfs` entry between the start directory and `/`.
    #[error("socket {SOCKET_NAME:?} not found above {0:?}; is the tree mounted?")]
    NotFound(PathBuf),
}

/// Walks upward from `start` looking for the `.tapfs` entry.
///
/// A candidate counts only when following it stats as a socket and its
/// symlink target is absolute. Returns the socket path and the directory it
/// was found in (the mount root).
pub fn find_socket(start: &Path) -> Result<(PathBuf, PathBuf), DiscoverError> {
    let mut dir = start;
    loop {
        let candidate = dir.join(SOCKET_NAME);
        if let Ok(md) = fs::metadata(&candidate) {
            if md.file_type().is_socket() {
                if let Ok(target) = fs::read_link(&candidate) {
                    if target.is_absolute() {
                        return Ok((target, dir.to_path_buf()));
                    }
                }
            }
        }
        dir = match dir.parent() {
            Some(parent) => parent,
            None => return Err(DiscoverError::NotFound(start.to_path_buf())),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use std::os::unix::net::UnixListener;

    #[test]
    fn test_finds_socket_from_nested_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("mnt");
        let nested = root.join("a/b");
        fs::create_dir_all(&nested).unwrap();

        let socket = tmp.path().join("socket");
        let _listener = UnixListener::bind(&socket).unwrap();
        symlink(&socket, root.join(SOCKET_NAME)).unwrap();

        let (found, topdir) = find_socket(&nested).unwrap();
        assert_eq!(found, socket);
        assert_eq!(topdir, root);
    }

    #[test]
    fn test_plain_file_is_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join(SOCKET_NAME), b"not a socket").unwrap();
        assert!(find_socket(tmp.path()).is_err());
    }

    #[test]
    fn test_relative_target_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let socket = tmp.path().join("socket");
        let _listener = UnixListener::bind(&socket).unwrap();
        // Reachable through the relative link, but the target string is not
        // absolute, so discovery keeps walking.
        symlink("socket", tmp.path().join(SOCKET_NAME)).unwrap();
        assert!(find_socket(tmp.path()).is_err());
    }

    #[test]
    fn test_nothing_found_reports_start_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let err = find_socket(tmp.path()).unwrap_err();
        assert!(err.to_string().contains(".tapfs"));
    }
}
