//! IPC Message Types
//!
//! The orchestrator sends at most one [`OrchestratorCommand`] per worker
//! (spawned workers only; forked workers inherit their config). Every worker
//! answers with a [`WorkerMessage::Hello`] followed by exactly one terminal
//! message.

use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};
use trackbench_core::BenchmarkConfig;

/// Handshake sent by a worker as soon as its channel is open
#[derive(Debug, Clone, PartialEq, Eq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct WorkerHello {
    /// Protocol version for compatibility
    pub protocol_version: u32,
    /// OS process id of the worker
    pub pid: u32,
}

impl WorkerHello {
    /// Hello for the calling process
    pub fn current() -> Self {
        Self {
            protocol_version: crate::PROTOCOL_VERSION,
            pid: std::process::id(),
        }
    }
}

/// Command sent from the orchestrator to a spawned worker
#[derive(Debug, Clone, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum OrchestratorCommand {
    /// Run the sequential loop once, then exit
    Run {
        /// Fully expanded configuration
        config: BenchmarkConfig,
        /// Position of this worker in the fan-out
        worker_index: u32,
        /// Offset added to every generated value
        shard_offset: u32,
    },
}

/// Why a worker did not complete its loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum FailureKind {
    /// The backend adapter returned an error
    Backend,
    /// The adapter panicked (caught)
    Panic,
    /// The worker could not build its backend from the config
    Config,
}

/// Messages sent from a worker to the orchestrator
#[derive(Debug, Clone, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum WorkerMessage {
    /// Initial handshake
    Hello(WorkerHello),

    /// The whole sequential loop succeeded
    Complete {
        /// Adapter invocations performed
        invocations: u32,
        /// Time spent in the loop, in nanoseconds
        elapsed_nanos: u64,
    },

    /// The loop stopped early
    Failure {
        /// Error category
        kind: FailureKind,
        /// Human-readable error message
        message: String,
        /// Adapter invocations that completed before the failure
        invocations: u32,
        /// Time to failure, in nanoseconds
        elapsed_nanos: u64,
    },
}
