//! The pass-through filesystem node.
//!
//! Every callback forwards to the backing directory; mutations and opens
//! additionally report to the attribution engine, keyed by the process
//! group of the calling PID. Attribution happens only after the forwarded
//! call succeeded, and the intent inferred at open time is authoritative:
//! per-handle reads and writes are never re-attributed.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{FileExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fuser::{
    FileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty,
    ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, ReplyXattr, Request, TimeOrNow,
};
use parking_lot::RwLock;
use tracing::{debug, warn};

use tapfs_core::{proc, OpClass, SessionRegistry};
use tapfs_proto::SOCKET_NAME;

use crate::attr;
use crate::inode::{InodeTable, ROOT_INO, SOCKET_INO};
use crate::mount::MountConfig;
use crate::sys;

/// Returns true when the open flags imply the file will be modified.
pub fn write_intent(flags: i32) -> bool {
    flags & (libc::O_TRUNC | libc::O_WRONLY | libc::O_RDWR) != 0
}

fn errno(err: &io::Error) -> i32 {
    err.raw_os_error().unwrap_or(libc::EIO)
}

/// The pass-through filesystem.
pub struct TapFs {
    backing: PathBuf,
    socket_target: PathBuf,
    ttl: Duration,
    registry: Arc<SessionRegistry>,
    inodes: InodeTable,
    handles: RwLock<HashMap<u64, Arc<File>>>,
    next_handle: AtomicU64,
}

impl TapFs {
    /// Creates a filesystem over `config.backing`.
    pub fn new(config: MountConfig, registry: Arc<SessionRegistry>) -> Self {
        Self {
            backing: config.backing,
            socket_target: config.socket_target,
            ttl: config.attr_ttl,
            registry,
            inodes: InodeTable::new(),
            handles: RwLock::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    fn backing_path(&self, rel: &str) -> PathBuf {
        if rel.is_empty() {
            self.backing.clone()
        } else {
            self.backing.join(rel)
        }
    }

    fn resolve(&self, ino: u64) -> Option<(String, PathBuf)> {
        let rel = self.inodes.path_of(ino)?;
        let full = self.backing_path(&rel);
        Some((rel, full))
    }

    fn resolve_child(&self, parent: u64, name: &str) -> Option<(String, PathBuf)> {
        let rel = self.inodes.child_path(parent, name)?;
        let full = self.backing_path(&rel);
        Some((rel, full))
    }

    fn allocate_handle(&self, file: File) -> u64 {
        let fh = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.handles.write().insert(fh, Arc::new(file));
        fh
    }

    fn handle(&self, fh: u64) -> Option<Arc<File>> {
        self.handles.read().get(&fh).cloned()
    }

    fn attribute(&self, req: &Request<'_>, path: &str, op: OpClass) {
        let pid = req.pid() as i32;
        let pgid = proc::pgid_of(pid);
        let session = self.registry.resolve(pgid);
        debug!(pid, pgid, session = session.id(), path, ?op, "attribute");
        session.record(path, op);
    }

    fn socket_attr(&self, req: &Request<'_>) -> fuser::FileAttr {
        attr::socket_symlink(
            SOCKET_INO,
            self.socket_target.as_os_str().len() as u64,
            req.uid(),
            req.gid(),
        )
    }

    fn open_options(flags: i32) -> OpenOptions {
        let access = flags & libc::O_ACCMODE;
        let mut opts = OpenOptions::new();
        opts.read(access == libc::O_RDONLY || access == libc::O_RDWR);
        opts.write(access == libc::O_WRONLY || access == libc::O_RDWR);
        opts.append(flags & libc::O_APPEND != 0);
        opts.truncate(flags & libc::O_TRUNC != 0 && access != libc::O_RDONLY);
        opts
    }
}

impl Filesystem for TapFs {
    fn lookup(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let name = name.to_string_lossy();
        debug!(parent, name = %name, "lookup");

        // The reserved socket entry shadows any backing file of that name.
        if parent == ROOT_INO && name == SOCKET_NAME {
            reply.entry(&self.ttl, &self.socket_attr(req), 0);
            return;
        }

        let Some((_, full)) = self.resolve_child(parent, &name) else {
            reply.error(libc::ENOENT);
            return;
        };
        match fs::symlink_metadata(&full) {
            Ok(md) => {
                let ino = self.inodes.intern(parent, &name);
                reply.entry(&self.ttl, &attr::from_metadata(ino, &md), 0);
            }
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn getattr(&mut self, req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        debug!(ino, "getattr");

        if ino == SOCKET_INO {
            reply.attr(&self.ttl, &self.socket_attr(req));
            return;
        }
        let Some((_, full)) = self.resolve(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match fs::symlink_metadata(&full) {
            Ok(md) => reply.attr(&self.ttl, &attr::from_metadata(ino, &md)),
            Err(err) => reply.error(errno(&err)),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<std::time::SystemTime>,
        fh: Option<u64>,
        _crtime: Option<std::time::SystemTime>,
        _chgtime: Option<std::time::SystemTime>,
        _bkuptime: Option<std::time::SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        debug!(ino, ?mode, ?uid, ?gid, ?size, "setattr");

        let Some((_, full)) = self.resolve(ino) else {
            reply.error(libc::ENOENT);
            return;
        };

        let result = (|| -> io::Result<()> {
            if let Some(size) = size {
                match fh.and_then(|fh| self.handle(fh)) {
                    Some(file) => file.set_len(size)?,
                    None => sys::truncate(&full, size)?,
                }
            }
            if let Some(mode) = mode {
                fs::set_permissions(&full, fs::Permissions::from_mode(mode & 0o7777))?;
            }
            if uid.is_some() || gid.is_some() {
                sys::chown(&full, uid, gid)?;
            }
            if atime.is_some() || mtime.is_some() {
                sys::set_times(&full, atime, mtime)?;
            }
            Ok(())
        })();

        match result.and_then(|_| fs::symlink_metadata(&full)) {
            Ok(md) => reply.attr(&self.ttl, &attr::from_metadata(ino, &md)),
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn readlink(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyData) {
        debug!(ino, "readlink");

        if ino == SOCKET_INO {
            reply.data(self.socket_target.as_os_str().as_bytes());
            return;
        }
        let Some((_, full)) = self.resolve(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match fs::read_link(&full) {
            Ok(target) => reply.data(target.as_os_str().as_bytes()),
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let name = name.to_string_lossy();
        debug!(parent, name = %name, mode, "mkdir");

        let Some((_, full)) = self.resolve_child(parent, &name) else {
            reply.error(libc::ENOENT);
            return;
        };
        let result = fs::create_dir(&full)
            .and_then(|_| fs::set_permissions(&full, fs::Permissions::from_mode(mode & 0o7777)))
            .and_then(|_| fs::symlink_metadata(&full));
        match result {
            Ok(md) => {
                let ino = self.inodes.intern(parent, &name);
                reply.entry(&self.ttl, &attr::from_metadata(ino, &md), 0);
            }
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn unlink(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let name = name.to_string_lossy();
        debug!(parent, name = %name, "unlink");

        let Some((rel, full)) = self.resolve_child(parent, &name) else {
            reply.error(libc::ENOENT);
            return;
        };
        match fs::remove_file(&full) {
            Ok(()) => {
                self.inodes.remove(parent, &name);
                self.attribute(req, &rel, OpClass::Delete);
                reply.ok();
            }
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let name = name.to_string_lossy();
        debug!(parent, name = %name, "rmdir");

        let Some((_, full)) = self.resolve_child(parent, &name) else {
            reply.error(libc::ENOENT);
            return;
        };
        match fs::remove_dir(&full) {
            Ok(()) => {
                self.inodes.remove(parent, &name);
                reply.ok();
            }
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn symlink(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        link_name: &OsStr,
        target: &Path,
        reply: ReplyEntry,
    ) {
        let name = link_name.to_string_lossy();
        debug!(parent, name = %name, target = %target.display(), "symlink");

        let Some((_, full)) = self.resolve_child(parent, &name) else {
            reply.error(libc::ENOENT);
            return;
        };
        let result =
            std::os::unix::fs::symlink(target, &full).and_then(|_| fs::symlink_metadata(&full));
        match result {
            Ok(md) => {
                let ino = self.inodes.intern(parent, &name);
                reply.entry(&self.ttl, &attr::from_metadata(ino, &md), 0);
            }
            Err(err) => reply.error(errno(&err)),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn rename(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        flags: u32,
        reply: ReplyEmpty,
    ) {
        let name = name.to_string_lossy();
        let newname = newname.to_string_lossy();
        debug!(parent, name = %name, newparent, newname = %newname, "rename");

        // RENAME_NOREPLACE / RENAME_EXCHANGE are not supported.
        if flags != 0 {
            reply.error(libc::EINVAL);
            return;
        }
        let (Some((old_rel, old_full)), Some((new_rel, new_full))) = (
            self.resolve_child(parent, &name),
            self.resolve_child(newparent, &newname),
        ) else {
            reply.error(libc::ENOENT);
            return;
        };
        match fs::rename(&old_full, &new_full) {
            Ok(()) => {
                self.inodes.rename(parent, &name, newparent, &newname);
                self.attribute(req, &old_rel, OpClass::Delete);
                self.attribute(req, &new_rel, OpClass::Create);
                reply.ok();
            }
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn open(&mut self, req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        debug!(ino, flags, "open");

        let Some((rel, full)) = self.resolve(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match Self::open_options(flags).open(&full) {
            Ok(file) => {
                let fh = self.allocate_handle(file);
                let op = if write_intent(flags) {
                    OpClass::Update
                } else {
                    OpClass::Read
                };
                self.attribute(req, &rel, op);
                reply.opened(fh, 0);
            }
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn create(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        let name = name.to_string_lossy();
        debug!(parent, name = %name, mode, flags, "create");

        let Some((rel, full)) = self.resolve_child(parent, &name) else {
            reply.error(libc::ENOENT);
            return;
        };
        let mut opts = Self::open_options(flags);
        opts.write(true).create(true).mode(mode & 0o7777);
        match opts.open(&full) {
            Ok(file) => {
                let ino = self.inodes.intern(parent, &name);
                let md = match file.metadata() {
                    Ok(md) => md,
                    Err(err) => {
                        reply.error(errno(&err));
                        return;
                    }
                };
                let fh = self.allocate_handle(file);
                self.attribute(req, &rel, OpClass::Create);
                reply.created(&self.ttl, &attr::from_metadata(ino, &md), 0, fh, 0);
            }
            Err(err) => reply.error(errno(&err)),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        debug!(ino, fh, offset, size, "read");

        let Some(file) = self.handle(fh) else {
            reply.error(libc::EBADF);
            return;
        };
        let mut buf = vec![0u8; size as usize];
        let mut filled = 0;
        loop {
            match file.read_at(&mut buf[filled..], offset as u64 + filled as u64) {
                Ok(0) => break,
                Ok(n) => {
                    filled += n;
                    if filled == buf.len() {
                        break;
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    reply.error(errno(&err));
                    return;
                }
            }
        }
        reply.data(&buf[..filled]);
    }

    #[allow(clippy::too_many_arguments)]
    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        debug!(ino, fh, offset, len = data.len(), "write");

        let Some(file) = self.handle(fh) else {
            reply.error(libc::EBADF);
            return;
        };
        match file.write_all_at(data, offset as u64) {
            Ok(()) => reply.written(data.len() as u32),
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn flush(&mut self, _req: &Request<'_>, ino: u64, fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        debug!(ino, fh, "flush");

        // Writes go straight to the backing file; nothing is buffered here.
        if self.handle(fh).is_some() {
            reply.ok();
        } else {
            reply.error(libc::EBADF);
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        debug!(ino, fh, "release");
        self.handles.write().remove(&fh);
        reply.ok();
    }

    fn fsync(&mut self, _req: &Request<'_>, ino: u64, fh: u64, datasync: bool, reply: ReplyEmpty) {
        debug!(ino, fh, datasync, "fsync");

        let Some(file) = self.handle(fh) else {
            reply.error(libc::EBADF);
            return;
        };
        let result = if datasync {
            file.sync_data()
        } else {
            file.sync_all()
        };
        match result {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        debug!(ino, "opendir");

        match self.resolve(ino) {
            Some((_, full)) if full.is_dir() => reply.opened(0, 0),
            Some(_) => reply.error(libc::ENOTDIR),
            None => reply.error(libc::ENOENT),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        debug!(ino, offset, "readdir");

        let Some((_, full)) = self.resolve(ino) else {
            reply.error(libc::ENOENT);
            return;
        };

        let mut entries: Vec<(u64, FileType, String)> = vec![
            (ino, FileType::Directory, ".".to_string()),
            (ino, FileType::Directory, "..".to_string()),
        ];
        if ino == ROOT_INO {
            entries.push((SOCKET_INO, FileType::Symlink, SOCKET_NAME.to_string()));
        }

        let listing = match fs::read_dir(&full) {
            Ok(listing) => listing,
            Err(err) => {
                reply.error(errno(&err));
                return;
            }
        };
        for entry in listing.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if ino == ROOT_INO && name == SOCKET_NAME {
                continue;
            }
            let kind = match entry.file_type() {
                Ok(ft) if ft.is_dir() => FileType::Directory,
                Ok(ft) if ft.is_symlink() => FileType::Symlink,
                _ => FileType::RegularFile,
            };
            let child = self.inodes.intern(ino, &name);
            entries.push((child, kind, name));
        }

        for (i, (child, kind, name)) in entries.into_iter().enumerate().skip(offset as usize) {
            if reply.add(child, (i + 1) as i64, kind, &name) {
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, _flags: i32, reply: ReplyEmpty) {
        debug!(ino, "releasedir");
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyStatfs) {
        debug!(ino, "statfs");

        match sys::statvfs(&self.backing) {
            Ok(stat) => reply.statfs(
                stat.f_blocks,
                stat.f_bfree,
                stat.f_bavail,
                stat.f_files,
                stat.f_ffree,
                stat.f_bsize as u32,
                stat.f_namemax as u32,
                stat.f_frsize as u32,
            ),
            Err(err) => {
                warn!(error = %err, "statvfs on backing dir failed");
                reply.error(errno(&err));
            }
        }
    }

    // The kernel must re-ask on every access so permission decisions are
    // never cached across sessions.
    fn access(&mut self, _req: &Request<'_>, _ino: u64, _mask: i32, reply: ReplyEmpty) {
        reply.error(libc::ENOSYS);
    }

    fn getxattr(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _name: &OsStr,
        _size: u32,
        reply: ReplyXattr,
    ) {
        reply.error(libc::ENOSYS);
    }
}
