//! Process-tree helpers backed by `/proc` and libc.

use std::fs;
use std::io;

/// Returns the parent PID of `pid`, or 1 when ancestry cannot be read.
///
/// Reads `/proc/<pid>/stat`; the parent is the second field after the
/// parenthesized command name, which may itself contain `)`.
pub fn parent_pid(pid: i32) -> i32 {
    let stat = match fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => stat,
        Err(_) => return 1,
    };
    let rest = match stat.rfind(')') {
        Some(idx) => &stat[idx + 1..],
        None => return 1,
    };
    let mut fields = rest.split_whitespace();
    let _state = fields.next();
    fields.next().and_then(|f| f.parse().ok()).unwrap_or(1)
}

/// Returns the process group of `pid`.
///
/// Falls back to `pid` itself when the process has already exited; callers
/// then resolve through the ancestor walk instead.
pub fn pgid_of(pid: i32) -> i32 {
    let pgid = unsafe { libc::getpgid(pid) };
    if pgid < 0 {
        pid
    } else {
        pgid
    }
}

/// Moves the calling process into a fresh process group with itself as
/// leader, so descendants it spawns share its PGID.
pub fn become_group_leader() -> io::Result<()> {
    if unsafe { libc::setpgid(0, 0) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_of_self() {
        let ppid = parent_pid(std::process::id() as i32);
        assert_eq!(ppid as u32, std::os::unix::process::parent_id());
    }

    #[test]
    fn test_parent_of_missing_pid() {
        assert_eq!(parent_pid(i32::MAX), 1);
    }

    #[test]
    fn test_pgid_of_self() {
        let pid = std::process::id() as i32;
        let pgid = pgid_of(pid);
        assert!(pgid > 0);
        assert_eq!(pgid, unsafe { libc::getpgrp() });
    }

    #[test]
    fn test_pgid_of_missing_pid_falls_back() {
        assert_eq!(pgid_of(i32::MAX), i32::MAX);
    }
}
