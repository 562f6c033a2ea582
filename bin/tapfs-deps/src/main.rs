//! tapfs record analysis - renders a directory of dependency records as a
//! DOT graph, or lists artifacts written by more than one command.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use tapfs_graph::{write_dot, DepGraph};
use tapfs_proto::load_dir;

/// Analyzes persisted tapfs dependency records.
#[derive(Parser)]
#[command(name = "tapfs-deps")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory of dependency records
    depdir: PathBuf,

    /// List artifacts written by more than one command instead of
    /// printing the graph
    #[arg(long)]
    conflicts: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let records =
        load_dir(&cli.depdir).with_context(|| format!("loading records from {:?}", cli.depdir))?;

    if cli.conflicts {
        let graph = DepGraph::from_records(&records);
        for conflict in graph.conflicts() {
            println!("{} written by {}", conflict.path, conflict.writers.join(", "));
        }
    } else {
        let mut stdout = io::stdout().lock();
        write_dot(&mut stdout, &records).context("writing graph")?;
        stdout.flush()?;
    }
    Ok(())
}
