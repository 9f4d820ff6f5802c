#![warn(missing_docs)]
//! Trackbench Core
//!
//! Shared harness pieces used by every backend-under-test:
//! - `BenchmarkConfig` and the identity fields that key result rows
//! - Profiles: named override sets expanded into concrete run configurations
//! - Timing recorder with a scoped `Stopwatch`
//! - Synthetic history records and the backend capability traits

mod backend;
mod config;
mod error;
mod profile;
mod record;
mod timing;

pub use backend::{Backend, LoadOutcome, RunIndex, Session, run_one, run_sequential};
pub use config::{BenchmarkConfig, IDENTITY_FIELDS, Identity, Mode};
pub use error::{BackendError, ConfigError};
pub use profile::{
    Candidates, OverrideSet, OverrideValue, Profile, ProfileRegistry, builtin_profiles,
};
pub use record::{HistoryRecord, Image, TABLE_COLUMNS, Table};
pub use timing::{Stopwatch, TimingLog, TimingRecord};

/// Version string written as the first column of every result row.
///
/// Bump when the workload or the row layout changes so results from
/// different harness revisions are never compared blindly.
pub const HARNESS_VERSION: &str = "v1-2024-04-11-0";
