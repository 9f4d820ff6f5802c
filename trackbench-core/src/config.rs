//! Benchmark Configuration
//!
//! One `BenchmarkConfig` describes a single ExpandedRun: who it is (identity),
//! how it runs (sequential/parallel shape), and what each session logs
//! (history shape). Field names match the CLI flags so profiles can override
//! them by name.

use crate::error::ConfigError;
use crate::profile::OverrideValue;
use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity field names, in result-row order.
pub const IDENTITY_FIELDS: [&str; 7] = [
    "test_name",
    "test_profile",
    "test_variant",
    "client_version",
    "client_type",
    "server_version",
    "server_type",
];

/// Backend connection mode
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    Archive,
    RkyvSerialize,
    RkyvDeserialize,
)]
#[archive(check_bytes)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Talk to the backend while the workload runs
    Online,
    /// Buffer locally; the backend is only touched when the session ends
    #[default]
    Offline,
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "online" => Ok(Mode::Online),
            "offline" => Ok(Mode::Offline),
            other => Err(ConfigError::UnknownMode(other.to_string())),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Online => f.write_str("online"),
            Mode::Offline => f.write_str("offline"),
        }
    }
}

/// Fields that label a result row for comparison across backends and versions
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    Archive,
    RkyvSerialize,
    RkyvDeserialize,
)]
#[archive(check_bytes)]
pub struct Identity {
    /// Free-form test name
    pub test_name: String,
    /// Profile this run was expanded from (empty for a plain run)
    pub test_profile: String,
    /// Variant label within the profile
    pub test_variant: String,
    /// Version of the client library under test
    pub client_version: String,
    /// Client flavour (e.g. "python", "go-core")
    pub client_type: String,
    /// Version of the tracking server
    pub server_version: String,
    /// Server flavour (e.g. "local", "saas")
    pub server_type: String,
}

impl Identity {
    /// Identity values in `IDENTITY_FIELDS` order
    pub fn values(&self) -> [&str; 7] {
        [
            &self.test_name,
            &self.test_profile,
            &self.test_variant,
            &self.client_version,
            &self.client_type,
            &self.server_version,
            &self.server_type,
        ]
    }

    fn field_mut(&mut self, name: &str) -> Option<&mut String> {
        match name {
            "test_name" => Some(&mut self.test_name),
            "test_profile" => Some(&mut self.test_profile),
            "test_variant" => Some(&mut self.test_variant),
            "client_version" => Some(&mut self.client_version),
            "client_type" => Some(&mut self.client_type),
            "server_version" => Some(&mut self.server_version),
            "server_type" => Some(&mut self.server_type),
            _ => None,
        }
    }
}

/// Full parameter set for one benchmark run
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Archive, RkyvSerialize, RkyvDeserialize,
)]
#[archive(check_bytes)]
pub struct BenchmarkConfig {
    /// Row identity
    pub identity: Identity,
    /// Backend connection mode
    pub mode: Mode,
    /// Sessions per worker (or per process when not parallel)
    pub num_sequential: u32,
    /// Worker processes; values <= 1 run in the calling process
    pub num_parallel: u32,
    /// Records logged per session
    pub num_history: u32,
    /// Float metrics per record
    pub history_floats: u32,
    /// Integer metrics per record
    pub history_ints: u32,
    /// String values per record
    pub history_strings: u32,
    /// Tables per record
    pub history_tables: u32,
    /// Images per record
    pub history_images: u32,
    /// Side length of each square RGB image
    pub history_images_dim: u32,
    /// Backend project
    pub project_name: String,
    /// Backend workspace
    pub workspace: String,
    /// Name of the backend adapter
    pub backend: String,
    /// Local storage root used by file-based backends
    pub store_dir: String,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            identity: Identity::default(),
            mode: Mode::Offline,
            num_sequential: 1,
            num_parallel: 1,
            num_history: 1,
            history_floats: 0,
            history_ints: 0,
            history_strings: 0,
            history_tables: 0,
            history_images: 0,
            history_images_dim: 16,
            project_name: "default_project".to_string(),
            workspace: "default_workspace".to_string(),
            backend: "file".to_string(),
            store_dir: "target/trackbench/store".to_string(),
        }
    }
}

impl BenchmarkConfig {
    /// Total backend sessions this configuration runs (`num_sequential × num_parallel`)
    pub fn total_invocations(&self) -> u64 {
        u64::from(self.num_sequential) * u64::from(self.num_parallel.max(1))
    }

    /// Whether the workload fans out across worker processes
    pub fn is_parallel(&self) -> bool {
        self.num_parallel > 1
    }

    /// Replace a single field by its CLI name.
    ///
    /// `backend` and `store_dir` are fixed per invocation and cannot be
    /// overridden.
    pub fn set_field(&mut self, name: &str, value: &OverrideValue) -> Result<(), ConfigError> {
        if let Some(slot) = self.identity.field_mut(name) {
            *slot = expect_str(name, value)?.to_string();
            return Ok(());
        }

        let slot = match name {
            "mode" => {
                self.mode = expect_str(name, value)?.parse()?;
                return Ok(());
            }
            "project_name" => {
                self.project_name = expect_str(name, value)?.to_string();
                return Ok(());
            }
            "workspace" => {
                self.workspace = expect_str(name, value)?.to_string();
                return Ok(());
            }
            "num_sequential" => &mut self.num_sequential,
            "num_parallel" => &mut self.num_parallel,
            "num_history" => &mut self.num_history,
            "history_floats" => &mut self.history_floats,
            "history_ints" => &mut self.history_ints,
            "history_strings" => &mut self.history_strings,
            "history_tables" => &mut self.history_tables,
            "history_images" => &mut self.history_images,
            "history_images_dim" => &mut self.history_images_dim,
            _ => return Err(ConfigError::UnknownField(name.to_string())),
        };
        *slot = expect_count(name, value)?;
        Ok(())
    }
}

fn expect_str<'a>(field: &str, value: &'a OverrideValue) -> Result<&'a str, ConfigError> {
    match value {
        OverrideValue::Str(s) => Ok(s),
        other => Err(ConfigError::FieldType {
            field: field.to_string(),
            expected: "a string",
            value: other.to_string(),
        }),
    }
}

fn expect_count(field: &str, value: &OverrideValue) -> Result<u32, ConfigError> {
    let err = || ConfigError::FieldType {
        field: field.to_string(),
        expected: "a non-negative integer",
        value: value.to_string(),
    };
    match value {
        OverrideValue::Int(n) => u32::try_from(*n).map_err(|_| err()),
        _ => Err(err()),
    }
}
