#![warn(missing_docs)]
//! Trackbench IPC Protocol
//!
//! Worker/orchestrator messages for the parallel fan-out, serialized with
//! rkyv and carried as length-prefixed frames over inherited pipes.

mod framing;
mod messages;

pub use framing::{FrameAssembler, FrameError, FrameReader, FrameWriter, MAX_FRAME_SIZE};
pub use messages::{FailureKind, OrchestratorCommand, WorkerHello, WorkerMessage};

/// Protocol version for compatibility checking
pub const PROTOCOL_VERSION: u32 = 1;

/// Hidden CLI flag that turns the binary into a spawned worker
pub const WORKER_FLAG: &str = "--trackbench-worker";

/// Environment variable naming the worker's `<read_fd>,<write_fd>` pair
pub const IPC_FD_ENV: &str = "TRACKBENCH_IPC_FD";

/// File descriptor a spawned worker reads commands from
pub const WORKER_COMMAND_FD: i32 = 3;

/// File descriptor a spawned worker writes messages to
pub const WORKER_MESSAGE_FD: i32 = 4;
