//! tapfs graph - build-graph analysis over persisted dependency records.
//!
//! Each record becomes an action; each path an artifact. Reads are inputs,
//! creates/updates/deletes are writes. The interesting findings are
//! artifacts written by more than one action, which usually indicates a
//! broken build graph.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

use std::collections::BTreeMap;
use std::io;

use tapfs_proto::DepRecord;

/// An artifact written by more than one action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    /// The artifact path, relative to the mount root.
    pub path: String,
    /// IDs of the actions that wrote it, in record order.
    pub writers: Vec<String>,
}

#[derive(Debug, Default)]
struct Artifact {
    read_by: Vec<String>,
    written_by: Vec<String>,
}

/// Artifact-centric view over a set of records.
#[derive(Debug, Default)]
pub struct DepGraph {
    artifacts: BTreeMap<String, Artifact>,
}

impl DepGraph {
    /// Builds the graph from loaded records.
    pub fn from_records(records: &[DepRecord]) -> Self {
        let mut artifacts: BTreeMap<String, Artifact> = BTreeMap::new();
        for record in records {
            for path in &record.read {
                artifacts
                    .entry(path.clone())
                    .or_default()
                    .read_by
                    .push(record.id.clone());
            }
            for path in record
                .create
                .iter()
                .chain(&record.update)
                .chain(&record.delete)
            {
                artifacts
                    .entry(path.clone())
                    .or_default()
                    .written_by
                    .push(record.id.clone());
            }
        }
        Self { artifacts }
    }

    /// Number of distinct artifacts.
    pub fn artifact_count(&self) -> usize {
        self.artifacts.len()
    }

    /// Actions that read `path`, in record order.
    pub fn readers_of(&self, path: &str) -> &[String] {
        self.artifacts
            .get(path)
            .map(|artifact| artifact.read_by.as_slice())
            .unwrap_or(&[])
    }

    /// Artifacts written by more than one action, in path order.
    ///
    /// Libtool's `.Tpo` droppings are rewritten by every compile and are
    /// exempt.
    pub fn conflicts(&self) -> Vec<Conflict> {
        self.artifacts
            .iter()
            .filter(|(path, artifact)| artifact.written_by.len() > 1 && !path.ends_with(".Tpo"))
            .map(|(path, artifact)| Conflict {
                path: path.clone(),
                writers: artifact.written_by.clone(),
            })
            .collect()
    }
}

/// Renders `records` as a DOT digraph: one edge per read into the action,
/// one per created or updated path out of it. Records that wrote nothing
/// are omitted.
pub fn write_dot<W: io::Write>(out: &mut W, records: &[DepRecord]) -> io::Result<()> {
    writeln!(out, "digraph {{")?;
    for record in records {
        if record.create.is_empty() && record.update.is_empty() {
            continue;
        }
        for path in &record.read {
            writeln!(out, "{:?} -> {:?};", path, record.id)?;
        }
        for path in record.create.iter().chain(&record.update) {
            writeln!(out, "{:?} -> {:?};", record.id, path)?;
        }
        writeln!(out)?;
    }
    writeln!(out, "}}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, read: &[&str], create: &[&str], update: &[&str]) -> DepRecord {
        DepRecord {
            id: id.to_string(),
            command: format!("step {id}"),
            dir: "/work".to_string(),
            read: read.iter().map(|s| s.to_string()).collect(),
            create: create.iter().map(|s| s.to_string()).collect(),
            update: update.iter().map(|s| s.to_string()).collect(),
            delete: Vec::new(),
        }
    }

    #[test]
    fn test_single_writer_is_clean() {
        let records = vec![
            record("1", &["a.c"], &["a.o"], &[]),
            record("2", &["a.o"], &["app"], &[]),
        ];
        let graph = DepGraph::from_records(&records);
        assert_eq!(graph.artifact_count(), 3);
        assert!(graph.conflicts().is_empty());
        assert_eq!(graph.readers_of("a.o"), ["2"]);
    }

    #[test]
    fn test_overlapping_writes_flagged() {
        let records = vec![
            record("1", &[], &["out"], &[]),
            record("2", &[], &[], &["out"]),
        ];
        let conflicts = DepGraph::from_records(&records).conflicts();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].path, "out");
        assert_eq!(conflicts[0].writers, ["1", "2"]);
    }

    #[test]
    fn test_tpo_paths_exempt() {
        let records = vec![
            record("1", &[], &["x.Tpo"], &[]),
            record("2", &[], &["x.Tpo"], &[]),
        ];
        assert!(DepGraph::from_records(&records).conflicts().is_empty());
    }

    #[test]
    fn test_dot_output() {
        let records = vec![
            record("1", &["a.c"], &["a.o"], &[]),
            // Pure readers contribute no edges.
            record("2", &["a.o"], &[], &[]),
        ];
        let mut out = Vec::new();
        write_dot(&mut out, &records).unwrap();
        let dot = String::from_utf8(out).unwrap();
        assert!(dot.starts_with("digraph {"));
        assert!(dot.contains("\"a.c\" -> \"1\";"));
        assert!(dot.contains("\"1\" -> \"a.o\";"));
        assert!(!dot.contains("\"a.o\" -> \"2\""));
        assert!(dot.trim_end().ends_with('}'));
    }
}
