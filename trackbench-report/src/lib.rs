#![warn(missing_docs)]
//! Trackbench Report - Result Store
//!
//! One CSV row per timed invocation:
//!
//! ```text
//! harness_version, test_name, test_profile, test_variant, client_version,
//! client_type, server_version, server_type, duration[, started_at, ended_at]
//! ```
//!
//! The file is opened in append mode and never truncated; several harness
//! processes may append to the same file at once.

mod render;
mod row;
mod writer;

pub use render::render_rows;
pub use row::{ROW_FIELDS, ResultRow};
pub use writer::{ResultWriteError, ResultWriter, read_rows};

/// Output format for `trackbench results`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Aligned columns for the terminal
    #[default]
    Human,
    /// JSON array of row objects
    Json,
    /// The raw CSV rows
    Csv,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" | "text" => Ok(OutputFormat::Human),
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            other => Err(format!("Unknown output format: {}", other)),
        }
    }
}
