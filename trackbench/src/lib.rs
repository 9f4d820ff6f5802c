#![warn(missing_docs)]
//! # Trackbench
//!
//! Measures how long a telemetry client takes to log metrics, strings,
//! tables and images to a backend, under sequential and multi-process load,
//! and appends one CSV row per measured run for cross-backend comparison.
//!
//! - **Profiles**: named override sets that expand one command line into many runs
//! - **Process fan-out**: `num_parallel` workers created by fork or spawn, joined with a barrier
//! - **Timing**: one scoped measurement per run, time-to-failure logged on errors
//! - **Result store**: append-only CSV rows keyed by identity fields
//!
//! ## Quick Start
//!
//! ```text
//! trackbench --backend null --num_sequential 3 --num_history 100 --history_floats 10
//! trackbench --test_profile parallel-sweep --test_name nightly
//! trackbench results bench_null.csv
//! ```
//!
//! ## Custom Backends
//!
//! ```ignore
//! use trackbench::{Backend, BackendError, BenchmarkConfig, HistoryRecord, RunIndex, Session};
//!
//! struct MyTracker;
//!
//! impl Backend for MyTracker {
//!     fn name(&self) -> &str { "my-tracker" }
//!     fn client_version(&self) -> String { "0.1.0".into() }
//!     fn begin_session(&self, config: &BenchmarkConfig, run: RunIndex)
//!         -> Result<Box<dyn Session>, BackendError> { todo!() }
//! }
//! ```

pub use trackbench_core::{
    Backend, BackendError, BenchmarkConfig, Candidates, ConfigError, HARNESS_VERSION,
    HistoryRecord, IDENTITY_FIELDS, Identity, Image, LoadOutcome, Mode, OverrideSet, OverrideValue,
    Profile, ProfileRegistry, RunIndex, Session, Stopwatch, TABLE_COLUMNS, Table, TimingLog,
    TimingRecord, builtin_profiles, run_one, run_sequential,
};

pub use trackbench_backends::{BACKEND_NAMES, FileBackend, NullBackend, backend_by_name};

pub use trackbench_report::{
    OutputFormat, ROW_FIELDS, ResultRow, ResultWriteError, ResultWriter, read_rows, render_rows,
};

pub use trackbench_cli::{
    Cli, ExecutionOptions, ExecutionPlan, Executor, FanOutReport, Orchestrator, StartMethod,
    Supervisor, SupervisorError, TrackbenchConfig, WorkerOutcome, WorkerStatus, build_plan,
    exit_code, run, run_with_cli, set_start_method,
};

/// IPC protocol between the orchestrator and its workers
pub mod ipc {
    pub use trackbench_ipc::*;
}
