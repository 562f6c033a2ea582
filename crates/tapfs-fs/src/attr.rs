//! Translation from backing-store metadata to FUSE attributes.

use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fuser::{FileAttr, FileType};

/// Converts Unix seconds + nanoseconds into a `SystemTime`.
fn unix_time(secs: i64, nanos: i64) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::new(secs as u64, nanos as u32)
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs())
    }
}

fn kind_from_mode(mode: u32) -> FileType {
    match mode & libc::S_IFMT {
        libc::S_IFDIR => FileType::Directory,
        libc::S_IFLNK => FileType::Symlink,
        libc::S_IFIFO => FileType::NamedPipe,
        libc::S_IFCHR => FileType::CharDevice,
        libc::S_IFBLK => FileType::BlockDevice,
        libc::S_IFSOCK => FileType::Socket,
        _ => FileType::RegularFile,
    }
}

/// Builds the attribute the kernel sees for a backing entry, using the
/// inode number from the table rather than the backing `st_ino`.
pub fn from_metadata(ino: u64, md: &Metadata) -> FileAttr {
    FileAttr {
        ino,
        size: md.size(),
        blocks: md.blocks(),
        atime: unix_time(md.atime(), md.atime_nsec()),
        mtime: unix_time(md.mtime(), md.mtime_nsec()),
        ctime: unix_time(md.ctime(), md.ctime_nsec()),
        crtime: unix_time(md.ctime(), md.ctime_nsec()),
        kind: kind_from_mode(md.mode()),
        perm: (md.mode() & 0o7777) as u16,
        nlink: md.nlink() as u32,
        uid: md.uid(),
        gid: md.gid(),
        rdev: md.rdev() as u32,
        blksize: md.blksize() as u32,
        flags: 0,
    }
}

/// Attribute of the synthetic socket symlink at the mount root.
pub fn socket_symlink(ino: u64, target_len: u64, uid: u32, gid: u32) -> FileAttr {
    let now = SystemTime::now();
    FileAttr {
        ino,
        size: target_len,
        blocks: 0,
        atime: now,
        mtime: now,
        ctime: now,
        crtime: now,
        kind: FileType::Symlink,
        perm: 0o777,
        nlink: 1,
        uid,
        gid,
        rdev: 0,
        blksize: 4096,
        flags: 0,
    }
}
