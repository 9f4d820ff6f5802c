//! Process Orchestrator
//!
//! `num_parallel <= 1` runs the sequential loop in the calling process with
//! shard offset 0. Anything larger fans out through the [`Supervisor`] using
//! the process-wide start method.

use crate::start_method::begin_spawning;
use crate::supervisor::{FanOutReport, Supervisor, SupervisorError};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use trackbench_core::{Backend, BackendError, BenchmarkConfig, run_sequential};

/// Why a run did not complete
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
}

/// What a completed run did
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Backend sessions completed
    pub invocations: u64,
    /// Per-worker outcomes of a parallel run
    pub fan_out: Option<FanOutReport>,
}

/// Executes one configuration `num_sequential × num_parallel` times
pub struct Orchestrator<'a> {
    backend: &'a dyn Backend,
    worker_timeout: Option<Duration>,
}

impl<'a> Orchestrator<'a> {
    /// Orchestrator driving `backend`
    pub fn new(backend: &'a dyn Backend) -> Self {
        Self {
            backend,
            worker_timeout: None,
        }
    }

    /// Bound the join barrier of parallel runs
    pub fn with_worker_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.worker_timeout = timeout;
        self
    }

    /// Backend under test
    pub fn backend(&self) -> &dyn Backend {
        self.backend
    }

    /// Run the workload described by `config`
    pub fn run(&self, config: &BenchmarkConfig) -> Result<RunSummary, RunError> {
        if !config.is_parallel() {
            let outcome = run_sequential(self.backend, config, 0);
            let invocations = u64::from(outcome.invocations);
            outcome.into_result()?;
            return Ok(RunSummary {
                invocations,
                fan_out: None,
            });
        }

        let method = begin_spawning();
        let report = Supervisor::new(self.backend, method)
            .with_timeout(self.worker_timeout)
            .fan_out(config)?;

        for failure in report.failures() {
            warn!(
                worker_index = failure.worker_index,
                shard_offset = failure.shard_offset,
                pid = failure.pid,
                status = ?failure.status,
                "worker did not complete"
            );
        }
        let report = report.into_result()?;
        debug!(
            workers = report.outcomes.len(),
            invocations = report.total_invocations(),
            "fan-out joined"
        );

        Ok(RunSummary {
            invocations: report.total_invocations(),
            fan_out: Some(report),
        })
    }
}
