//! tapfs wrapper - runs one shell command under dependency tracing.
//!
//! Discovers the session socket by walking upward from the starting
//! directory to the mount root, opens a session for its own fresh process
//! group, runs the command, and writes the dependency record the server
//! hands back.

use std::env;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use tapfs_rpc::{find_socket, run_traced, RunOptions};

/// Runs a shell command and records which paths it read, created, updated,
/// and deleted.
#[derive(Parser)]
#[command(name = "tapfs")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory inside the mount to start socket discovery from
    /// (defaults to the current directory)
    #[arg(long)]
    dir: Option<PathBuf>,

    /// The shell command to trace
    #[arg(short = 'c', value_name = "COMMANDLINE")]
    command: String,

    /// Keep the record of a failed command under <ID>.failed.json
    #[arg(long)]
    keep_failed: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder().with_max_level(Level::WARN).finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set up logging")?;

    refuse_intercepting_path()?;

    let start = match cli.dir {
        Some(dir) => dir,
        None => env::current_dir().context("getcwd")?,
    };
    let start = start
        .canonicalize()
        .with_context(|| format!("start dir {:?}", start))?;
    let (socket, _topdir) = find_socket(&start)?;

    let cwd = env::current_dir().context("getcwd")?;
    let options = RunOptions {
        keep_failed: cli.keep_failed,
    };
    let outcome = run_traced(&socket, &cli.command, &cwd, &options)?;
    std::process::exit(outcome.exit_code);
}

/// Compiler caches short-circuit file access behind the filesystem's back,
/// which silently produces incomplete records.
fn refuse_intercepting_path() -> Result<()> {
    let path = env::var("PATH").unwrap_or_default();
    for entry in path.split(':') {
        if entry.contains("ccache") {
            bail!("found 'ccache' in $PATH entry {entry:?}; tracing would miss its hits");
        }
    }
    Ok(())
}
