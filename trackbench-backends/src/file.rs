//! File Backend
//!
//! Local run store shaped like an offline experiment directory:
//!
//! ```text
//! <store_dir>/<workspace>/<project_name>/<run-id>/
//!     history.jsonl
//!     tables/t_{i}-{step}.csv
//!     images/i_{i}-{step}.ppm
//!     run.json
//! ```
//!
//! `online` sessions create the layout up front and append + flush each
//! record as it is logged. `offline` sessions keep everything in memory and
//! touch the filesystem only in `end`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;
use trackbench_core::{
    Backend, BackendError, BenchmarkConfig, HistoryRecord, Identity, Image, Mode, RunIndex,
    Session, TABLE_COLUMNS, Table,
};

const NAME: &str = "file";
const HISTORY_FILE: &str = "history.jsonl";
const MANIFEST_FILE: &str = "run.json";

static SESSIONS_OPENED: AtomicU64 = AtomicU64::new(0);

/// Adapter writing each session to its own run directory under `store_dir`
#[derive(Debug, Clone, Copy, Default)]
pub struct FileBackend;

impl FileBackend {
    /// Directory that holds every run of `config`'s project
    pub fn project_dir(config: &BenchmarkConfig) -> PathBuf {
        Path::new(&config.store_dir)
            .join(&config.workspace)
            .join(&config.project_name)
    }
}

impl Backend for FileBackend {
    fn name(&self) -> &str {
        NAME
    }

    fn client_version(&self) -> String {
        env!("CARGO_PKG_VERSION").to_string()
    }

    fn begin_session(
        &self,
        config: &BenchmarkConfig,
        run: RunIndex,
    ) -> Result<Box<dyn Session>, BackendError> {
        let started_at = Utc::now();
        let run_id = format!(
            "run-{}-p{}-n{}-m{}-{}",
            started_at.format("%Y%m%dT%H%M%S"),
            std::process::id(),
            run.run_index,
            run.shard_offset,
            SESSIONS_OPENED.fetch_add(1, Ordering::Relaxed)
        );
        let dir = Self::project_dir(config).join(run_id);

        let history = match config.mode {
            Mode::Online => Some(open_layout(&dir).map_err(|e| BackendError::Connect {
                backend: NAME.to_string(),
                message: format!("{}: {}", dir.display(), e),
            })?),
            Mode::Offline => None,
        };
        debug!(dir = %dir.display(), mode = %config.mode, "file session opened");

        Ok(Box::new(FileSession {
            dir,
            history,
            pending: Vec::new(),
            manifest: RunManifest {
                backend: NAME,
                mode: config.mode,
                identity: config.identity.clone(),
                run_index: run.run_index,
                shard_offset: run.shard_offset,
                pid: std::process::id(),
                records: 0,
                started_at,
                ended_at: None,
            },
        }))
    }
}

/// Session summary written to `run.json` when the session ends
#[derive(Debug, Serialize)]
struct RunManifest {
    backend: &'static str,
    mode: Mode,
    identity: Identity,
    run_index: u32,
    shard_offset: u32,
    pid: u32,
    records: u32,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
}

/// A file produced by one logged value
struct Artifact {
    relative: String,
    bytes: Vec<u8>,
}

/// One encoded history line plus the files it references
struct Entry {
    line: String,
    artifacts: Vec<Artifact>,
}

struct FileSession {
    dir: PathBuf,
    /// Open only in online mode
    history: Option<BufWriter<File>>,
    /// Filled only in offline mode
    pending: Vec<Entry>,
    manifest: RunManifest,
}

impl FileSession {
    fn write_error(&self, step: u32, message: impl ToString) -> BackendError {
        BackendError::Write {
            backend: NAME.to_string(),
            step,
            message: message.to_string(),
        }
    }

    fn close_error(&self, message: impl ToString) -> BackendError {
        BackendError::Close {
            backend: NAME.to_string(),
            message: format!("{}: {}", self.dir.display(), message.to_string()),
        }
    }

    fn flush_pending(&mut self) -> io::Result<()> {
        let mut history = open_layout(&self.dir)?;
        for entry in self.pending.drain(..) {
            write_entry(&self.dir, &mut history, &entry)?;
        }
        history.flush()
    }

    fn write_manifest(&self) -> io::Result<()> {
        let file = File::create(self.dir.join(MANIFEST_FILE))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &self.manifest)?;
        writer.write_all(b"\n")?;
        writer.flush()
    }
}

impl Session for FileSession {
    fn log_record(&mut self, record: &HistoryRecord) -> Result<(), BackendError> {
        let entry = encode_record(record).map_err(|e| self.write_error(record.step, e))?;

        match self.history.as_mut() {
            Some(history) => {
                let written = write_entry(&self.dir, history, &entry).and_then(|_| history.flush());
                written.map_err(|e| self.write_error(record.step, e))?;
            }
            None => self.pending.push(entry),
        }
        self.manifest.records += 1;
        Ok(())
    }

    fn end(mut self: Box<Self>) -> Result<(), BackendError> {
        match self.history.take() {
            Some(mut history) => history.flush().map_err(|e| self.close_error(e))?,
            None => self.flush_pending().map_err(|e| self.close_error(e))?,
        }

        self.manifest.ended_at = Some(Utc::now());
        self.write_manifest().map_err(|e| self.close_error(e))?;
        debug!(
            dir = %self.dir.display(),
            records = self.manifest.records,
            "file session closed"
        );
        Ok(())
    }
}

/// Create the run directory and open its history file for appending
fn open_layout(dir: &Path) -> io::Result<BufWriter<File>> {
    fs::create_dir_all(dir.join("tables"))?;
    fs::create_dir_all(dir.join("images"))?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(HISTORY_FILE))?;
    Ok(BufWriter::new(file))
}

fn write_entry(dir: &Path, history: &mut BufWriter<File>, entry: &Entry) -> io::Result<()> {
    for artifact in &entry.artifacts {
        fs::write(dir.join(&artifact.relative), &artifact.bytes)?;
    }
    history.write_all(entry.line.as_bytes())?;
    history.write_all(b"\n")
}

fn encode_record(record: &HistoryRecord) -> Result<Entry, String> {
    let mut map = Map::new();
    let mut artifacts = Vec::new();
    map.insert("_step".to_string(), Value::from(record.step));

    for (key, value) in &record.floats {
        map.insert(key.clone(), Value::from(*value));
    }
    for (key, value) in &record.ints {
        map.insert(key.clone(), Value::from(*value));
    }
    for (key, value) in &record.strings {
        map.insert(key.clone(), Value::from(value.as_str()));
    }
    for (key, table) in &record.tables {
        let relative = format!("tables/{}-{}.csv", key, record.step);
        map.insert(
            key.clone(),
            json!({ "_type": "table-file", "path": relative, "nrows": table.rows.len() }),
        );
        artifacts.push(Artifact {
            relative,
            bytes: encode_table(table).map_err(|e| e.to_string())?,
        });
    }
    for (key, image) in &record.images {
        let relative = format!("images/{}-{}.ppm", key, record.step);
        map.insert(
            key.clone(),
            json!({ "_type": "image-file", "path": relative, "width": image.dim, "height": image.dim }),
        );
        artifacts.push(Artifact {
            relative,
            bytes: encode_ppm(image),
        });
    }

    let line = serde_json::to_string(&Value::Object(map)).map_err(|e| e.to_string())?;
    Ok(Entry { line, artifacts })
}

fn encode_table(table: &Table) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(TABLE_COLUMNS)?;
    for row in &table.rows {
        writer.write_record(row.iter().map(|v| v.to_string()))?;
    }
    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

/// Binary PPM (P6): text header, then raw RGB bytes
fn encode_ppm(image: &Image) -> Vec<u8> {
    let mut bytes = format!("P6\n{} {}\n255\n", image.dim, image.dim).into_bytes();
    bytes.extend_from_slice(&image.pixels);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use trackbench_core::run_one;

    fn config(store: &Path, mode: Mode) -> BenchmarkConfig {
        BenchmarkConfig {
            mode,
            num_history: 3,
            history_floats: 2,
            history_ints: 1,
            history_strings: 1,
            history_tables: 1,
            history_images: 1,
            history_images_dim: 2,
            store_dir: store.to_string_lossy().into_owned(),
            ..Default::default()
        }
    }

    fn run_dirs(config: &BenchmarkConfig) -> Vec<PathBuf> {
        let mut dirs: Vec<_> = fs::read_dir(FileBackend::project_dir(config))
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        dirs.sort();
        dirs
    }

    #[test]
    fn test_online_session_layout() {
        let store = TempDir::new().unwrap();
        let config = config(store.path(), Mode::Online);
        let run = RunIndex {
            run_index: 1,
            shard_offset: 2,
        };
        run_one(&FileBackend, &config, run).unwrap();

        let dirs = run_dirs(&config);
        assert_eq!(dirs.len(), 1);
        let dir = &dirs[0];

        let history = fs::read_to_string(dir.join(HISTORY_FILE)).unwrap();
        let lines: Vec<Value> = history
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["_step"], 0);
        assert_eq!(lines[0]["f_1"], 4.0);
        assert_eq!(lines[2]["n_0"], 5);
        assert_eq!(lines[1]["s_0"], "4");
        assert_eq!(lines[1]["t_0"]["path"], "tables/t_0-1.csv");

        let table = fs::read_to_string(dir.join("tables/t_0-2.csv")).unwrap();
        assert_eq!(table, "a,b,c,d\n3,2,0,1\n");

        let image = fs::read(dir.join("images/i_0-0.ppm")).unwrap();
        assert!(image.starts_with(b"P6\n2 2\n255\n"));
        assert_eq!(image.len(), b"P6\n2 2\n255\n".len() + 2 * 2 * 3);

        let manifest: Value =
            serde_json::from_str(&fs::read_to_string(dir.join(MANIFEST_FILE)).unwrap()).unwrap();
        assert_eq!(manifest["records"], 3);
        assert_eq!(manifest["mode"], "online");
        assert_eq!(manifest["shard_offset"], 2);
    }

    #[test]
    fn test_offline_session_defers_writes() {
        let store = TempDir::new().unwrap();
        let config = config(store.path(), Mode::Offline);

        let mut session = FileBackend
            .begin_session(&config, RunIndex::default())
            .unwrap();
        let record = HistoryRecord::generate(&config, RunIndex::default(), 0);
        session.log_record(&record).unwrap();
        assert!(!FileBackend::project_dir(&config).exists());

        session.end().unwrap();
        let dirs = run_dirs(&config);
        assert_eq!(dirs.len(), 1);
        let history = fs::read_to_string(dirs[0].join(HISTORY_FILE)).unwrap();
        assert_eq!(history.lines().count(), 1);
        assert!(dirs[0].join("tables/t_0-0.csv").exists());
    }

    #[test]
    fn test_each_session_gets_its_own_directory() {
        let store = TempDir::new().unwrap();
        let config = config(store.path(), Mode::Offline);
        for _ in 0..3 {
            run_one(&FileBackend, &config, RunIndex::default()).unwrap();
        }
        assert_eq!(run_dirs(&config).len(), 3);
    }

    #[test]
    fn test_unwritable_store_fails_online_connect() {
        let store = TempDir::new().unwrap();
        let blocker = store.path().join("not-a-dir");
        fs::write(&blocker, b"occupied").unwrap();

        let config = config(&blocker, Mode::Online);
        let result = FileBackend.begin_session(&config, RunIndex::default());
        assert!(matches!(result, Err(BackendError::Connect { .. })));
    }

    #[test]
    fn test_unwritable_store_fails_offline_close() {
        let store = TempDir::new().unwrap();
        let blocker = store.path().join("not-a-dir");
        fs::write(&blocker, b"occupied").unwrap();

        let config = config(&blocker, Mode::Offline);
        let result = run_one(&FileBackend, &config, RunIndex::default());
        assert!(matches!(result, Err(BackendError::Close { .. })));
    }
}
