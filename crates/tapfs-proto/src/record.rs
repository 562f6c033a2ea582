//! The persisted dependency record.

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Record persistence errors.
#[derive(Debug, Error)]
pub enum RecordError {
    /// Filesystem failure while writing or reading a record.
    #[error("I/O error on {path:?}: {source}")]
    Io {
        /// The file involved.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },

    /// A record file did not parse.
    #[error("malformed record {path:?}: {source}")]
    Malformed {
        /// The file involved.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },
}

/// One command invocation's I/O footprint, as written to
/// `<depdir>/<ID>.json`.
///
/// Field names are the external contract; the four path arrays are always
/// present, ascending, and unique. Paths are relative to the mount root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepRecord {
    /// Session ID: the decimal rendering of a server-assigned integer.
    #[serde(rename = "ID")]
    pub id: String,
    /// The literal shell command line that was traced.
    #[serde(rename = "Command")]
    pub command: String,
    /// Absolute working directory the command ran in.
    #[serde(rename = "Dir")]
    pub dir: String,
    /// Paths opened without write intent.
    #[serde(rename = "Read", default)]
    pub read: Vec<String>,
    /// Paths newly created.
    #[serde(rename = "Create", default)]
    pub create: Vec<String>,
    /// Existing paths opened with write intent.
    #[serde(rename = "Update", default)]
    pub update: Vec<String>,
    /// Paths removed.
    #[serde(rename = "Delete", default)]
    pub delete: Vec<String>,
}

impl DepRecord {
    /// The canonical file name for this record.
    pub fn file_name(&self) -> String {
        format!("{}.json", self.id)
    }

    /// Writes the record into `dir` under `file_name`, atomically and with
    /// mode `0644`. Returns the final path.
    pub fn write_to(&self, dir: &Path, file_name: &str) -> Result<PathBuf, RecordError> {
        let final_path = dir.join(file_name);
        let tmp_path = dir.join(format!(".{file_name}.tmp"));

        let body = serde_json::to_vec(self).map_err(|source| RecordError::Malformed {
            path: final_path.clone(),
            source,
        })?;

        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| RecordError::Io { path, source }
        };

        fs::write(&tmp_path, &body).map_err(io_err(&tmp_path))?;
        fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o644))
            .map_err(io_err(&tmp_path))?;
        fs::rename(&tmp_path, &final_path).map_err(io_err(&final_path))?;
        Ok(final_path)
    }
}

/// Loads every `*.json` record in `dir`, in file-name order.
pub fn load_dir(dir: &Path) -> Result<Vec<DepRecord>, RecordError> {
    let entries = fs::read_dir(dir).map_err(|source| RecordError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut records = Vec::with_capacity(paths.len());
    for path in paths {
        let body = fs::read(&path).map_err(|source| RecordError::Io {
            path: path.clone(),
            source,
        })?;
        let record =
            serde_json::from_slice(&body).map_err(|source| RecordError::Malformed {
                path: path.clone(),
                source,
            })?;
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DepRecord {
        DepRecord {
            id: "7".to_string(),
            command: "cc -c a.c".to_string(),
            dir: "/work/src".to_string(),
            read: vec!["a.c".to_string(), "a.h".to_string()],
            create: vec!["a.o".to_string()],
            update: Vec::new(),
            delete: Vec::new(),
        }
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_string(&sample()).unwrap();
        assert_eq!(
            json,
            r#"{"ID":"7","Command":"cc -c a.c","Dir":"/work/src","Read":["a.c","a.h"],"Create":["a.o"],"Update":[],"Delete":[]}"#
        );
    }

    #[test]
    fn test_empty_arrays_not_omitted() {
        let record = DepRecord {
            id: "1".to_string(),
            ..DepRecord::default()
        };
        let json = serde_json::to_string(&record).unwrap();
        for field in ["Read", "Create", "Update", "Delete"] {
            assert!(json.contains(&format!("\"{field}\":[]")), "{json}");
        }
    }

    #[test]
    fn test_write_is_atomic_and_0644() {
        let dir = tempfile::tempdir().unwrap();
        let record = sample();
        let path = record.write_to(dir.path(), &record.file_name()).unwrap();

        assert_eq!(path, dir.path().join("7.json"));
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);

        // No temp file left behind.
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn test_load_dir_roundtrip_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let mut second = sample();
        second.id = "8".to_string();
        second.write_to(dir.path(), &second.file_name()).unwrap();
        sample().write_to(dir.path(), &sample().file_name()).unwrap();
        // Non-record files are ignored.
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let records = load_dir(dir.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], sample());
        assert_eq!(records[1].id, "8");
    }

    #[test]
    fn test_load_dir_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("1.json"), b"not json").unwrap();
        assert!(matches!(
            load_dir(dir.path()),
            Err(RecordError::Malformed { .. })
        ));
    }
}
