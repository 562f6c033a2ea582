//! Executes one traced shell command and persists its dependency record.

use std::io;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use thiserror::Error;
use tracing::{debug, info};

use tapfs_core::proc;
use tapfs_proto::{DepRecord, Method, RecordError};

use crate::client::{RpcClient, RpcError};

/// Runner configuration.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Persist the record of a failed command under `<ID>.failed.json`
    /// instead of discarding it.
    pub keep_failed: bool,
}

/// What happened to the traced command.
#[derive(Debug)]
pub struct RunOutcome {
    /// The child's exit code (`128 + signo` when killed by a signal).
    pub exit_code: i32,
    /// Where the record was written, when it was written at all.
    pub record_path: Option<PathBuf>,
}

/// Runner failures. A nonzero child exit is not an error; it is reported
/// through [`RunOutcome::exit_code`].
#[derive(Debug, Error)]
pub enum RunError {
    /// `setpgid` refused to make this process a group leader.
    #[error("failed to enter a new process group: {0}")]
    ProcessGroup(io::Error),

    /// The session RPC failed; without it nothing was traced.
    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// `/bin/sh` could not be spawned at all.
    #[error("failed to spawn /bin/sh: {0}")]
    Spawn(io::Error),

    /// The record could not be persisted.
    #[error(transparent)]
    Record(#[from] RecordError),
}

/// Traces `commandline` through the server at `socket`.
///
/// The calling process becomes a process-group leader first, so every
/// descendant of the spawned shell resolves to the session opened here.
/// `EndTrace` is issued no matter how the child fared; the record is only
/// written when the child succeeded (or `keep_failed` is set).
pub fn run_traced(
    socket: &Path,
    commandline: &str,
    dir: &Path,
    options: &RunOptions,
) -> Result<RunOutcome, RunError> {
    let mut client = RpcClient::dial(socket)?;

    proc::become_group_leader().map_err(RunError::ProcessGroup)?;
    let pgid = std::process::id() as i32;
    client.call(Method::StartTrace, pgid)?;
    debug!(pgid, command = commandline, "trace opened");

    let status = Command::new("/bin/sh")
        .arg("-c")
        .arg(commandline)
        .current_dir(dir)
        .status();

    // The session must be closed even when the child failed or never ran.
    let end = client.call(Method::EndTrace, pgid);

    let status = status.map_err(RunError::Spawn)?;
    let end = end?;
    let exit_code = exit_code(status);

    let mut outcome = RunOutcome {
        exit_code,
        record_path: None,
    };
    if !status.success() && !options.keep_failed {
        info!(exit_code, "command failed; record discarded");
        return Ok(outcome);
    }

    let record = DepRecord {
        id: end.id.clone(),
        command: commandline.to_string(),
        dir: dir.display().to_string(),
        read: end.read,
        create: end.create,
        update: end.update,
        delete: end.delete,
    };
    let file_name = if status.success() {
        record.file_name()
    } else {
        format!("{}.failed.json", record.id)
    };
    let path = record.write_to(Path::new(&end.dep_dir), &file_name)?;
    info!(record = %path.display(), exit_code, "record written");
    outcome.record_path = Some(path);
    Ok(outcome)
}

fn exit_code(status: ExitStatus) -> i32 {
    match status.code() {
        Some(code) => code,
        None => 128 + status.signal().unwrap_or(0),
    }
}
