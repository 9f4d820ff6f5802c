//! Error Taxonomy
//!
//! `ConfigError` is raised before any run starts; `BackendError` comes out of
//! the workload itself and is surfaced after the timing record is captured.

use thiserror::Error;

/// Invalid configuration, detected before any workload runs
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Unknown profile '{name}' (available: {available})")]
    UnknownProfile { name: String, available: String },

    #[error("Profile '{0}' is registered more than once")]
    DuplicateProfile(String),

    #[error("Profile '{0}' has no override sets")]
    EmptyProfile(String),

    #[error("Unknown configuration field '{0}'")]
    UnknownField(String),

    #[error("Field '{field}' expects {expected}, got {value}")]
    FieldType {
        field: String,
        expected: &'static str,
        value: String,
    },

    #[error("Field '{0}' lists no candidate values")]
    EmptyCandidates(String),

    #[error("Unknown mode '{0}' (expected 'online' or 'offline')")]
    UnknownMode(String),

    #[error("Unknown backend '{name}' (available: {available})")]
    UnknownBackend { name: String, available: String },

    #[error("Missing required identity field '{0}'")]
    MissingIdentity(&'static str),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Process start method is already set")]
    StartMethodAlreadySet,

    #[error("Process start method cannot change after workers were spawned")]
    StartMethodAfterSpawn,
}

/// Failure raised by a backend adapter or by a worker of a parallel fan-out
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{backend}: failed to open session: {message}")]
    Connect { backend: String, message: String },

    #[error("{backend}: failed to log record at step {step}: {message}")]
    Write {
        backend: String,
        step: u32,
        message: String,
    },

    #[error("{backend}: failed to close session: {message}")]
    Close { backend: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{failed} of {total} worker(s) failed; first failure: {first}")]
    Workers {
        failed: usize,
        total: usize,
        first: String,
    },
}
