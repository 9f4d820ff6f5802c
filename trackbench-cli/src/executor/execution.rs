//! Run Execution
//!
//! Every ExpandedRun gets exactly one timed region around the orchestrator
//! call. On success the timing log is drained into the result file; on
//! failure the time-to-failure is logged, no row is written and the error
//! stops the plan.

use super::orchestrator::{Orchestrator, RunError};
use crate::planner::{ExecutionPlan, run_label};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use trackbench_core::{HARNESS_VERSION, TimingLog, TimingRecord};
use trackbench_report::{ResultWriteError, ResultWriter};

/// Failure that stops a plan
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Run '{label}' failed after {elapsed:.3?}")]
    Run {
        label: String,
        elapsed: Duration,
        #[source]
        source: RunError,
    },

    #[error(transparent)]
    Write(#[from] ResultWriteError),
}

/// Execution settings
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionOptions {
    /// Draw a progress bar for plans with more than one run
    pub show_progress: bool,
}

/// Totals of a completed plan
#[derive(Debug, Clone, Default)]
pub struct ExecutionSummary {
    /// Runs executed
    pub runs: usize,
    /// Rows appended to the result file
    pub rows: usize,
    /// Backend sessions across all runs
    pub invocations: u64,
    /// Every persisted timing record, in run order
    pub timings: Vec<TimingRecord>,
}

/// Runs a plan and persists one row per timed run
pub struct Executor<'a> {
    orchestrator: Orchestrator<'a>,
    writer: ResultWriter,
    options: ExecutionOptions,
}

impl<'a> Executor<'a> {
    /// Executor writing to `writer`
    pub fn new(orchestrator: Orchestrator<'a>, writer: ResultWriter, options: ExecutionOptions) -> Self {
        Self {
            orchestrator,
            writer,
            options,
        }
    }

    /// Execute every run of `plan`, stopping at the first failure
    pub fn execute(&mut self, plan: &ExecutionPlan) -> Result<ExecutionSummary, ExecutionError> {
        let pb = if self.options.show_progress && plan.len() > 1 {
            let pb = ProgressBar::new(plan.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template(
                        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            pb
        } else {
            ProgressBar::hidden()
        };

        let mut log = TimingLog::new();
        let mut summary = ExecutionSummary::default();

        for config in &plan.runs {
            let label = run_label(config);
            pb.set_message(label.clone());
            info!(
                run = %label,
                backend = self.orchestrator.backend().name(),
                sequential = config.num_sequential,
                parallel = config.num_parallel,
                "starting run"
            );

            let (record, result) = log.measure(label.clone(), || self.orchestrator.run(config));
            let run = match result {
                Ok(run) => run,
                Err(source) => {
                    log.drain();
                    pb.abandon();
                    error!(
                        run = %label,
                        time_to_failure_secs = record.duration_secs(),
                        "run failed: {}",
                        source
                    );
                    return Err(ExecutionError::Run {
                        label,
                        elapsed: record.duration,
                        source,
                    });
                }
            };

            let records = log.drain();
            summary.rows += self
                .writer
                .append(HARNESS_VERSION, &config.identity, &records)?;
            summary.runs += 1;
            summary.invocations += run.invocations;
            summary.timings.extend(records);
            info!(
                run = %label,
                duration_secs = record.duration_secs(),
                invocations = run.invocations,
                "run complete"
            );
            pb.inc(1);
        }

        pb.finish_with_message("Complete");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::build_plan;
    use tempfile::TempDir;
    use trackbench_backends::NullBackend;
    use trackbench_core::{
        Backend, BackendError, BenchmarkConfig, OverrideSet, Profile, ProfileRegistry, RunIndex,
        Session,
    };
    use trackbench_report::read_rows;

    fn registry() -> ProfileRegistry {
        ProfileRegistry::with_builtins([Profile::new("variants", "three variants")
            .with_set(OverrideSet::new().with("test_variant", "a"))
            .with_set(OverrideSet::new().with("test_variant", "b"))
            .with_set(OverrideSet::new().with("test_variant", "c"))])
        .unwrap()
    }

    #[test]
    fn test_one_row_per_run() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bench_null.csv");
        let base = BenchmarkConfig {
            num_sequential: 3,
            num_history: 2,
            history_floats: 1,
            ..Default::default()
        };
        let plan = build_plan(&registry(), &base, "", false).unwrap();

        let writer = ResultWriter::open(&path, false).unwrap();
        let mut executor = Executor::new(
            Orchestrator::new(&NullBackend),
            writer,
            ExecutionOptions::default(),
        );
        let summary = executor.execute(&plan).unwrap();

        assert_eq!(summary.runs, 1);
        assert_eq!(summary.rows, 1);
        assert_eq!(summary.invocations, 3);
        assert_eq!(summary.timings.len(), 1);
        assert_eq!(read_rows(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_profile_rows_carry_variants() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bench_null.csv");
        let mut base = BenchmarkConfig::default();
        base.identity.test_name = "variants".into();
        base.identity.test_profile = "variants".into();
        let plan = build_plan(&registry(), &base, "variants", false).unwrap();

        let writer = ResultWriter::open(&path, false).unwrap();
        let mut executor = Executor::new(
            Orchestrator::new(&NullBackend),
            writer,
            ExecutionOptions::default(),
        );
        executor.execute(&plan).unwrap();

        let rows = read_rows(&path).unwrap();
        let variants: Vec<_> = rows
            .iter()
            .map(|r| r.identity.test_variant.as_str())
            .collect();
        assert_eq!(variants, ["a", "b", "c"]);
        assert!(rows.iter().all(|r| r.identity.test_profile == "variants"));
        assert!(rows.iter().all(|r| r.harness_version == HARNESS_VERSION));
    }

    struct Refusing;

    impl Backend for Refusing {
        fn name(&self) -> &str {
            "refusing"
        }

        fn client_version(&self) -> String {
            "0".into()
        }

        fn begin_session(
            &self,
            _config: &BenchmarkConfig,
            _run: RunIndex,
        ) -> Result<Box<dyn Session>, BackendError> {
            std::thread::sleep(Duration::from_millis(2));
            Err(BackendError::Connect {
                backend: "refusing".into(),
                message: "connection refused".into(),
            })
        }
    }

    #[test]
    fn test_failed_run_writes_no_row() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bench_refusing.csv");
        let plan = build_plan(&registry(), &BenchmarkConfig::default(), "variants", false).unwrap();

        let writer = ResultWriter::open(&path, false).unwrap();
        let mut executor =
            Executor::new(Orchestrator::new(&Refusing), writer, ExecutionOptions::default());
        let err = executor.execute(&plan).unwrap_err();

        match err {
            ExecutionError::Run { label, elapsed, .. } => {
                assert_eq!(label, "a");
                assert!(elapsed >= Duration::from_millis(2));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(read_rows(&path).unwrap().is_empty());
    }
}
