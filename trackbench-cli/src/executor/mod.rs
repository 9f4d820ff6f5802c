//! Run Executor
//!
//! ```text
//! ExecutionPlan (expanded runs)
//!       │
//!       ▼
//! ┌──────────────┐
//! │  execution   │  One timed region per run, rows appended on success
//! └──────┬───────┘
//!        │
//!        ▼
//! ┌──────────────┐
//! │ orchestrator │  In-process loop, or fan-out through the supervisor
//! └──────────────┘
//! ```

mod execution;
mod orchestrator;

pub use execution::{ExecutionError, ExecutionOptions, ExecutionSummary, Executor};
pub use orchestrator::{Orchestrator, RunError, RunSummary};
