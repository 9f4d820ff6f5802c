//! End-to-end tests of the `trackbench` binary

use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use trackbench::{FileBackend, ROW_FIELDS, TrackbenchConfig, read_rows};

fn trackbench(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_trackbench"))
        .current_dir(dir)
        .args(args)
        .output()
        .unwrap()
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "status: {:?}\nstderr: {}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );
}

fn project_dir(dir: &Path) -> PathBuf {
    let config = trackbench::BenchmarkConfig {
        store_dir: dir.join("store").to_string_lossy().into_owned(),
        ..Default::default()
    };
    FileBackend::project_dir(&config)
}

/// Session directories written by the file backend under `dir/store`
fn run_dirs(dir: &Path) -> usize {
    match std::fs::read_dir(project_dir(dir)) {
        Ok(entries) => entries.count(),
        Err(_) => 0,
    }
}

/// Pid of the process that wrote each session under `dir/store`
fn session_pids(dir: &Path) -> Vec<u32> {
    let Ok(entries) = std::fs::read_dir(project_dir(dir)) else {
        return Vec::new();
    };
    entries
        .filter_map(|entry| {
            let name = entry.ok()?.file_name().into_string().ok()?;
            name.split('-').find_map(|part| part.strip_prefix('p')?.parse().ok())
        })
        .collect()
}

#[test]
fn test_sequential_run_appends_one_row() {
    let dir = TempDir::new().unwrap();
    let output = trackbench(
        dir.path(),
        &[
            "--num_sequential",
            "3",
            "--num_parallel",
            "1",
            "--num_history",
            "2",
            "--history_floats",
            "1",
            "--store_dir",
            "store",
            "--test_name",
            "seq",
        ],
    );
    assert_success(&output);

    let rows = read_rows(dir.path().join("bench_file.csv")).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].identity.test_name, "seq");
    assert!(!rows[0].identity.client_version.is_empty());
    assert!(rows[0].duration_secs > 0.0);
    assert_eq!(run_dirs(dir.path()), 3);
}

#[test]
fn test_parallel_run_appends_one_row() {
    let dir = TempDir::new().unwrap();
    let output = trackbench(
        dir.path(),
        &[
            "--num_sequential",
            "2",
            "--num_parallel",
            "4",
            "--history_ints",
            "1",
            "--store_dir",
            "store",
        ],
    );
    assert_success(&output);

    let rows = read_rows(dir.path().join("bench_file.csv")).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(run_dirs(dir.path()), 8);
}

#[test]
fn test_config_profile_expands_to_rows() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("trackbench.toml"),
        r#"
[runner]
backend = "null"

[profiles.variants]
description = "three labels"
sets = [{ test_variant = ["a", "b", "c"], num_history = 2 }]
"#,
    )
    .unwrap();

    let output = trackbench(dir.path(), &["--test_profile", "variants"]);
    assert_success(&output);

    let rows = read_rows(dir.path().join("bench_null.csv")).unwrap();
    let variants: Vec<_> = rows
        .iter()
        .map(|row| row.identity.test_variant.as_str())
        .collect();
    assert_eq!(variants, ["a", "b", "c"]);
    assert!(rows.iter().all(|row| row.identity.test_profile == "variants"));
}

#[test]
fn test_unknown_profile_is_config_error() {
    let dir = TempDir::new().unwrap();
    let output = trackbench(dir.path(), &["--test_profile", "does-not-exist"]);

    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("does-not-exist"));
    assert!(!dir.path().join("bench_file.csv").exists());
}

#[test]
fn test_unknown_backend_is_config_error() {
    let dir = TempDir::new().unwrap();
    let output = trackbench(dir.path(), &["--backend", "bogus"]);

    assert_eq!(output.status.code(), Some(2));
    assert!(!dir.path().join("bench_bogus.csv").exists());
}

#[test]
fn test_result_file_is_append_only() {
    let dir = TempDir::new().unwrap();
    let args = ["--backend", "null", "--outfile", "results.csv"];
    let outfile = dir.path().join("results.csv");

    assert_success(&trackbench(dir.path(), &args));
    let first = std::fs::read_to_string(&outfile).unwrap();
    assert_success(&trackbench(dir.path(), &args));
    let second = std::fs::read_to_string(&outfile).unwrap();

    assert!(second.starts_with(&first));
    assert_eq!(second.lines().count(), 2);
}

#[test]
fn test_timestamps_add_columns() {
    let dir = TempDir::new().unwrap();
    assert_success(&trackbench(
        dir.path(),
        &["--backend", "null", "--timestamps"],
    ));

    let content = std::fs::read_to_string(dir.path().join("bench_null.csv")).unwrap();
    let line = content.lines().next().unwrap();
    assert_eq!(line.split(',').count(), ROW_FIELDS.len());

    let rows = read_rows(dir.path().join("bench_null.csv")).unwrap();
    assert!(rows[0].started_at.is_some());
}

#[test]
fn test_dry_run_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let output = trackbench(
        dir.path(),
        &["--test_profile", "payload-mix", "--dry_run", "--store_dir", "store"],
    );
    assert_success(&output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("Trackbench Plan:"));
    assert!(stdout.contains("5 run(s)"));
    assert!(!dir.path().join("bench_file.csv").exists());
    assert_eq!(run_dirs(dir.path()), 0);
}

#[test]
fn test_profiles_lists_builtins() {
    let dir = TempDir::new().unwrap();
    let output = trackbench(dir.path(), &["profiles"]);
    assert_success(&output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    for name in ["history-sweep", "parallel-sweep", "payload-mix", "image-dims"] {
        assert!(stdout.contains(name), "missing {}", name);
    }
    assert!(stdout.contains("4 profiles registered."));
}

#[test]
fn test_init_prints_loadable_config() {
    let dir = TempDir::new().unwrap();
    let output = trackbench(dir.path(), &["init"]);
    assert_success(&output);

    let path = dir.path().join("trackbench.toml");
    std::fs::write(&path, &output.stdout).unwrap();
    let config = TrackbenchConfig::load(&path).unwrap();
    assert_eq!(config.runner.backend, "file");
    assert!(config.profiles.is_empty());
}

#[test]
fn test_results_renders_rows() {
    let dir = TempDir::new().unwrap();
    assert_success(&trackbench(
        dir.path(),
        &["--backend", "null", "--test_name", "render-me"],
    ));

    let output = trackbench(dir.path(), &["results", "bench_null.csv"]);
    assert_success(&output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("render-me"));
    assert!(stdout.contains("1 row(s)"));

    let output = trackbench(dir.path(), &["results", "bench_null.csv", "--format", "json"]);
    assert_success(&output);
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json[0]["identity"]["test_name"], "render-me");
}

#[test]
fn test_unparseable_config_file_is_config_error() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("trackbench.toml"), "[runner\nbackend = ").unwrap();

    let output = trackbench(dir.path(), &["--backend", "null"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("trackbench.toml"));
    assert!(!dir.path().join("bench_null.csv").exists());
}

#[test]
fn test_bad_worker_timeout_is_config_error() {
    let dir = TempDir::new().unwrap();
    for timeout in ["soon", "99999999999999999999h"] {
        let output = trackbench(
            dir.path(),
            &["--backend", "null", "--num_parallel", "2", "--worker_timeout", timeout],
        );
        assert_eq!(output.status.code(), Some(2), "timeout {:?}", timeout);
    }
    assert!(!dir.path().join("bench_null.csv").exists());
}

#[test]
fn test_parallel_run_with_killed_worker() {
    let dir = TempDir::new().unwrap();
    let mut child = Command::new(env!("CARGO_BIN_EXE_trackbench"))
        .current_dir(dir.path())
        .args([
            "--num_sequential",
            "2000",
            "--num_parallel",
            "2",
            "--num_history",
            "1",
            "--store_dir",
            "store",
        ])
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();

    // The first session directory names the worker that opened it
    let started = Instant::now();
    let victim = loop {
        if let Some(&pid) = session_pids(dir.path()).first() {
            break pid;
        }
        assert!(
            started.elapsed() < Duration::from_secs(30),
            "no worker opened a session"
        );
        std::thread::sleep(Duration::from_millis(1));
    };
    let killed = Command::new("kill")
        .args(["-9", &victim.to_string()])
        .status()
        .unwrap();
    assert!(killed.success());

    let output = child.wait_with_output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("worker(s) failed"));

    let rows = read_rows(dir.path().join("bench_file.csv"))
        .map(|rows| rows.len())
        .unwrap_or(0);
    assert_eq!(rows, 0);

    let pids = session_pids(dir.path());
    let sibling = pids.iter().filter(|&&pid| pid != victim).count();
    assert_eq!(sibling, 2000);
}

#[test]
fn test_zero_parallel_runs_in_process() {
    let dir = TempDir::new().unwrap();
    let output = trackbench(
        dir.path(),
        &[
            "--num_sequential",
            "2",
            "--num_parallel",
            "0",
            "--store_dir",
            "store",
        ],
    );
    assert_success(&output);

    let rows = read_rows(dir.path().join("bench_file.csv")).unwrap();
    assert_eq!(rows.len(), 1);

    let pids = session_pids(dir.path());
    assert_eq!(pids.len(), 2);
    assert!(pids.iter().all(|&pid| pid == pids[0]));
    for entry in std::fs::read_dir(project_dir(dir.path())).unwrap() {
        let manifest = std::fs::read_to_string(entry.unwrap().path().join("run.json")).unwrap();
        let manifest: serde_json::Value = serde_json::from_str(&manifest).unwrap();
        assert_eq!(manifest["shard_offset"], 0);
    }
}
