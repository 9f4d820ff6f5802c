//! Backend Capability Interface
//!
//! Each backend-under-test exposes `begin_session` / `log_record` / `end`.
//! The harness core only drives these calls; connection handling and the
//! online/offline distinction stay inside the adapter.

use crate::config::BenchmarkConfig;
use crate::error::BackendError;
use crate::record::HistoryRecord;
use tracing::{debug, trace};

/// Coordinates of one backend session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RunIndex {
    /// Position in the sequential loop (0-based)
    pub run_index: u32,
    /// Offset of the worker that owns the loop (0 outside a fan-out)
    pub shard_offset: u32,
}

impl RunIndex {
    /// `run_index + shard_offset`, the seed of every generated value
    pub fn base(&self) -> i64 {
        i64::from(self.run_index) + i64::from(self.shard_offset)
    }
}

/// A telemetry backend that can open logging sessions
pub trait Backend: Send + Sync {
    /// Short adapter name (used for lookup and default file names)
    fn name(&self) -> &str;

    /// Default `client_version` identity value
    fn client_version(&self) -> String;

    /// Open a session for one run
    fn begin_session(
        &self,
        config: &BenchmarkConfig,
        run: RunIndex,
    ) -> Result<Box<dyn Session>, BackendError>;
}

/// An open logging session
pub trait Session {
    /// Log one history record
    fn log_record(&mut self, record: &HistoryRecord) -> Result<(), BackendError>;

    /// Flush and close the session
    fn end(self: Box<Self>) -> Result<(), BackendError>;
}

/// Run one session: `num_history` records between `begin_session` and `end`
pub fn run_one(
    backend: &dyn Backend,
    config: &BenchmarkConfig,
    run: RunIndex,
) -> Result<(), BackendError> {
    debug!(
        backend = backend.name(),
        mode = %config.mode,
        run_index = run.run_index,
        shard_offset = run.shard_offset,
        "starting session"
    );

    let mut session = backend.begin_session(config, run)?;
    for step in 0..config.num_history {
        let record = HistoryRecord::generate(config, run, step);
        trace!(step, values = record.value_count(), "logging record");
        session.log_record(&record)?;
    }
    session.end()
}

/// Result of a sequential loop: sessions completed before any failure
#[derive(Debug)]
pub struct LoadOutcome {
    /// Sessions that ran to completion
    pub invocations: u32,
    /// First failure, if the loop stopped early
    pub result: Result<(), BackendError>,
}

impl LoadOutcome {
    /// Drop the invocation count and keep the result
    pub fn into_result(self) -> Result<(), BackendError> {
        self.result
    }
}

/// Run `num_sequential` sessions with run indices `0..num_sequential`.
///
/// Stops at the first failing session.
pub fn run_sequential(
    backend: &dyn Backend,
    config: &BenchmarkConfig,
    shard_offset: u32,
) -> LoadOutcome {
    let mut invocations = 0;
    for run_index in 0..config.num_sequential {
        let run = RunIndex {
            run_index,
            shard_offset,
        };
        if let Err(e) = run_one(backend, config, run) {
            return LoadOutcome {
                invocations,
                result: Err(e),
            };
        }
        invocations += 1;
    }
    LoadOutcome {
        invocations,
        result: Ok(()),
    }
}
