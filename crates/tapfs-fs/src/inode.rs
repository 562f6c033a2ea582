//! Inode bookkeeping for the pass-through tree.
//!
//! Inodes map to backing paths indirectly: each entry stores its parent and
//! name, and relative paths are resolved by walking the parent chain. A
//! directory rename therefore never leaves stale paths behind.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

/// The mount root (FUSE convention).
pub const ROOT_INO: u64 = 1;

/// The synthetic socket symlink at the mount root.
pub const SOCKET_INO: u64 = 2;

struct Entry {
    parent: u64,
    name: String,
}

/// Table of known inodes.
pub struct InodeTable {
    inner: RwLock<Inner>,
    next: AtomicU64,
}

struct Inner {
    entries: HashMap<u64, Entry>,
    by_name: HashMap<(u64, String), u64>,
}

impl InodeTable {
    /// Creates a table containing only the root.
    pub fn new() -> Self {
        let mut entries = HashMap::new();
        entries.insert(
            ROOT_INO,
            Entry {
                parent: ROOT_INO,
                name: String::new(),
            },
        );
        Self {
            inner: RwLock::new(Inner {
                entries,
                by_name: HashMap::new(),
            }),
            next: AtomicU64::new(SOCKET_INO + 1),
        }
    }

    /// Returns the inode for `name` under `parent`, allocating one if the
    /// pair has not been seen before.
    pub fn intern(&self, parent: u64, name: &str) -> u64 {
        if let Some(&ino) = self.inner.read().by_name.get(&(parent, name.to_string())) {
            return ino;
        }
        let mut inner = self.inner.write();
        // Racing callers may have interned it between the locks.
        if let Some(&ino) = inner.by_name.get(&(parent, name.to_string())) {
            return ino;
        }
        let ino = self.next.fetch_add(1, Ordering::Relaxed);
        inner.entries.insert(
            ino,
            Entry {
                parent,
                name: name.to_string(),
            },
        );
        inner.by_name.insert((parent, name.to_string()), ino);
        ino
    }

    /// Resolves an inode to its path relative to the mount root: empty for
    /// the root itself, forward-slash separated otherwise.
    pub fn path_of(&self, ino: u64) -> Option<String> {
        if ino == ROOT_INO {
            return Some(String::new());
        }
        let inner = self.inner.read();
        let mut segments = Vec::new();
        let mut cur = ino;
        while cur != ROOT_INO {
            let entry = inner.entries.get(&cur)?;
            segments.push(entry.name.clone());
            cur = entry.parent;
        }
        segments.reverse();
        Some(segments.join("/"))
    }

    /// Resolves the relative path of `name` under `parent` without
    /// interning it.
    pub fn child_path(&self, parent: u64, name: &str) -> Option<String> {
        let dir = self.path_of(parent)?;
        if dir.is_empty() {
            Some(name.to_string())
        } else {
            Some(format!("{dir}/{name}"))
        }
    }

    /// Forgets the entry for `name` under `parent`, if known.
    pub fn remove(&self, parent: u64, name: &str) {
        let mut inner = self.inner.write();
        if let Some(ino) = inner.by_name.remove(&(parent, name.to_string())) {
            inner.entries.remove(&ino);
        }
    }

    /// Re-parents an entry after a successful rename. An overwritten
    /// destination entry is dropped.
    pub fn rename(&self, parent: u64, name: &str, new_parent: u64, new_name: &str) {
        let mut inner = self.inner.write();
        if let Some(dest) = inner
            .by_name
            .remove(&(new_parent, new_name.to_string()))
        {
            inner.entries.remove(&dest);
        }
        if let Some(ino) = inner.by_name.remove(&(parent, name.to_string())) {
            if let Some(entry) = inner.entries.get_mut(&ino) {
                entry.parent = new_parent;
                entry.name = new_name.to_string();
            }
            inner.by_name.insert((new_parent, new_name.to_string()), ino);
        }
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_path_is_empty() {
        let table = InodeTable::new();
        assert_eq!(table.path_of(ROOT_INO), Some(String::new()));
    }

    #[test]
    fn test_intern_is_stable() {
        let table = InodeTable::new();
        let a = table.intern(ROOT_INO, "src");
        let b = table.intern(ROOT_INO, "src");
        assert_eq!(a, b);
        assert!(a > SOCKET_INO);
    }

    #[test]
    fn test_nested_path_resolution() {
        let table = InodeTable::new();
        let src = table.intern(ROOT_INO, "src");
        let main = table.intern(src, "main.c");
        assert_eq!(table.path_of(main).unwrap(), "src/main.c");
        assert_eq!(table.child_path(src, "lib.c").unwrap(), "src/lib.c");
        assert_eq!(table.child_path(ROOT_INO, "Makefile").unwrap(), "Makefile");
    }

    #[test]
    fn test_directory_rename_moves_descendants() {
        let table = InodeTable::new();
        let src = table.intern(ROOT_INO, "src");
        let main = table.intern(src, "main.c");

        table.rename(ROOT_INO, "src", ROOT_INO, "lib");
        assert_eq!(table.path_of(main).unwrap(), "lib/main.c");
    }

    #[test]
    fn test_rename_overwrites_destination() {
        let table = InodeTable::new();
        let old = table.intern(ROOT_INO, "a");
        let dest = table.intern(ROOT_INO, "b");
        table.rename(ROOT_INO, "a", ROOT_INO, "b");
        assert_eq!(table.path_of(old).unwrap(), "b");
        assert_eq!(table.path_of(dest), None);
    }

    #[test]
    fn test_remove_forgets_entry() {
        let table = InodeTable::new();
        let ino = table.intern(ROOT_INO, "gone");
        table.remove(ROOT_INO, "gone");
        assert_eq!(table.path_of(ino), None);
        // A fresh intern allocates a new inode.
        assert_ne!(table.intern(ROOT_INO, "gone"), ino);
    }
}
