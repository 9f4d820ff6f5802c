//! Append-Only Writer
//!
//! Each row is encoded into memory first and handed to the OS in a single
//! `write` on an `O_APPEND` descriptor, so rows from concurrent writers never
//! interleave mid-line.

use crate::row::ResultRow;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use trackbench_core::{Identity, TimingRecord};

/// Errors from the result store
#[derive(Debug, Error)]
pub enum ResultWriteError {
    #[error("Failed to open result file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write result file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Malformed row at line {line}: {message}")]
    Malformed { line: u64, message: String },
}

/// Append handle on a result file, held for the process lifetime
#[derive(Debug)]
pub struct ResultWriter {
    path: PathBuf,
    file: File,
    timestamps: bool,
}

impl ResultWriter {
    /// Open `path` for appending, creating it if absent
    pub fn open(path: impl AsRef<Path>, timestamps: bool) -> Result<Self, ResultWriteError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| ResultWriteError::Open {
                path: path.clone(),
                source,
            })?;
        debug!(path = %path.display(), "result file opened");
        Ok(Self {
            path,
            file,
            timestamps,
        })
    }

    /// Path of the result file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row per timing record; returns the number of rows written
    pub fn append(
        &mut self,
        harness_version: &str,
        identity: &Identity,
        records: &[TimingRecord],
    ) -> Result<usize, ResultWriteError> {
        for record in records {
            let row = ResultRow::new(harness_version, identity, record, self.timestamps);
            self.append_row(&row)?;
        }
        Ok(records.len())
    }

    /// Append a single prepared row
    pub fn append_row(&mut self, row: &ResultRow) -> Result<(), ResultWriteError> {
        let mut encoder = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::with_capacity(256));
        encoder.write_record(row.fields())?;
        let bytes = encoder
            .into_inner()
            .map_err(|e| csv::Error::from(e.into_error()))?;

        self.file
            .write_all(&bytes)
            .map_err(|source| ResultWriteError::Write {
                path: self.path.clone(),
                source,
            })
    }
}

/// Read every row of a result file
pub fn read_rows(path: impl AsRef<Path>) -> Result<Vec<ResultRow>, ResultWriteError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| ResultWriteError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(file);

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        rows.push(ResultRow::from_record(&record?, index as u64 + 1)?);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn timing(millis: u64) -> TimingRecord {
        let started_at = Utc::now();
        TimingRecord {
            label: "run".into(),
            started_at,
            ended_at: started_at + chrono::TimeDelta::milliseconds(millis as i64),
            duration: Duration::from_millis(millis),
        }
    }

    fn identity(variant: &str) -> Identity {
        Identity {
            test_name: "append".into(),
            test_profile: "sweep".into(),
            test_variant: variant.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_append_creates_and_reads_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bench.csv");

        let mut writer = ResultWriter::open(&path, false).unwrap();
        let written = writer
            .append("v1", &identity("a"), &[timing(250)])
            .unwrap();
        assert_eq!(written, 1);

        let rows = read_rows(&path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].harness_version, "v1");
        assert_eq!(rows[0].identity.test_variant, "a");
        assert_eq!(rows[0].duration_secs, 0.25);
        assert!(rows[0].started_at.is_none());
    }

    #[test]
    fn test_append_never_rewrites_earlier_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bench.csv");

        {
            let mut writer = ResultWriter::open(&path, true).unwrap();
            writer.append("v1", &identity("a"), &[timing(10)]).unwrap();
        }
        let before = std::fs::read(&path).unwrap();

        for variant in ["b", "c"] {
            let mut writer = ResultWriter::open(&path, true).unwrap();
            writer
                .append("v1", &identity(variant), &[timing(20)])
                .unwrap();
        }
        let after = std::fs::read(&path).unwrap();

        assert!(after.starts_with(&before));
        let rows = read_rows(&path).unwrap();
        assert_eq!(rows.len(), 3);
        let variants: Vec<_> = rows
            .iter()
            .map(|r| r.identity.test_variant.as_str())
            .collect();
        assert_eq!(variants, ["a", "b", "c"]);
        assert!(rows.iter().all(|r| r.ended_at >= r.started_at));
    }

    #[test]
    fn test_fields_with_commas_are_quoted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bench.csv");

        let mut writer = ResultWriter::open(&path, false).unwrap();
        writer
            .append("v1", &identity("num_history=1,floats=2"), &[timing(1)])
            .unwrap();

        let rows = read_rows(&path).unwrap();
        assert_eq!(rows[0].identity.test_variant, "num_history=1,floats=2");
    }

    #[test]
    fn test_open_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let result = ResultWriter::open(dir.path().join("missing/bench.csv"), false);
        assert!(matches!(result, Err(ResultWriteError::Open { .. })));
    }
}
