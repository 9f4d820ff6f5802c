//! Configuration loading from trackbench.toml
//!
//! Settings can be placed in a `trackbench.toml` file in the project root. The
//! file is discovered by walking up from the current directory; CLI flags
//! override whatever it sets.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use trackbench_core::{Candidates, ConfigError, OverrideSet, OverrideValue, Profile};

/// Name of the configuration file
pub const CONFIG_FILE: &str = "trackbench.toml";

/// Trackbench configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TrackbenchConfig {
    /// Runner configuration
    #[serde(default)]
    pub runner: RunnerConfig,
    /// Output configuration
    #[serde(default)]
    pub output: OutputConfig,
    /// User profiles, keyed by name
    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileConfig>,
}

/// Runner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Backend adapter used when `--backend` is not given
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Result file; defaults to `bench_<backend>.csv`
    #[serde(default)]
    pub outfile: Option<String>,
    /// Start workers from a fresh image instead of forking
    #[serde(default)]
    pub use_spawn: bool,
    /// Upper bound on the join barrier (e.g. "90s", "10m"); unset waits forever
    #[serde(default)]
    pub worker_timeout: Option<String>,
    /// Refuse to run without `--test_name`
    #[serde(default)]
    pub require_test_name: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            outfile: None,
            use_spawn: false,
            worker_timeout: None,
            require_test_name: false,
        }
    }
}

fn default_backend() -> String {
    "file".to_string()
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Append `started_at`/`ended_at` to every row
    #[serde(default)]
    pub timestamps: bool,
    /// Storage root of the file backend
    #[serde(default = "default_store_dir")]
    pub store_dir: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            timestamps: false,
            store_dir: default_store_dir(),
        }
    }
}

fn default_store_dir() -> String {
    "target/trackbench/store".to_string()
}

/// A profile declared in the configuration file
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProfileConfig {
    /// One-line description shown by `trackbench profiles`
    #[serde(default)]
    pub description: String,
    /// Override sets; an array value lists candidates for that field
    #[serde(default)]
    pub sets: Vec<toml::Table>,
}

impl ProfileConfig {
    /// Build a [`Profile`]; sets with array values expand to their product
    pub fn to_profile(&self, name: &str) -> Result<Profile, ConfigError> {
        let mut profile = Profile::new(name, self.description.clone());
        for set in &self.sets {
            let mut axes = Vec::with_capacity(set.len());
            for (field, value) in set {
                axes.push((field.clone(), candidates(field, value)?));
            }
            if axes.iter().all(|(_, c)| matches!(c, Candidates::One(_))) {
                let mut fixed = OverrideSet::new();
                for (field, candidates) in axes {
                    if let Candidates::One(value) = candidates {
                        fixed = fixed.with(field, value);
                    }
                }
                profile = profile.with_set(fixed);
            } else {
                profile = profile.with_product(axes)?;
            }
        }
        Ok(profile)
    }
}

fn candidates(field: &str, value: &toml::Value) -> Result<Candidates, ConfigError> {
    match value {
        toml::Value::Array(values) => values
            .iter()
            .map(|v| scalar(field, v))
            .collect::<Result<Vec<_>, _>>()
            .map(Candidates::Many),
        other => scalar(field, other).map(Candidates::One),
    }
}

fn scalar(field: &str, value: &toml::Value) -> Result<OverrideValue, ConfigError> {
    match value {
        toml::Value::Integer(n) => Ok(OverrideValue::Int(*n)),
        toml::Value::String(s) => Ok(OverrideValue::Str(s.clone())),
        other => Err(ConfigError::FieldType {
            field: field.to_string(),
            expected: "an integer or string",
            value: other.to_string(),
        }),
    }
}

impl TrackbenchConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::Invalid(format!("cannot read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content)
            .map_err(|e| ConfigError::Invalid(format!("{}: {}", path.display(), e)))
    }

    /// Walk up from the current directory looking for `trackbench.toml`.
    ///
    /// A file that exists but fails to parse is an error, not a silent default.
    pub fn discover() -> anyhow::Result<Option<Self>> {
        let mut dir = std::env::current_dir()?;
        loop {
            let config_path = dir.join(CONFIG_FILE);
            if config_path.exists() {
                tracing::debug!(path = %config_path.display(), "loading configuration");
                return Ok(Some(Self::load(&config_path)?));
            }
            if !dir.pop() {
                break;
            }
        }
        Ok(None)
    }

    /// Profiles declared in the file, in name order
    pub fn user_profiles(&self) -> Result<Vec<Profile>, ConfigError> {
        self.profiles
            .iter()
            .map(|(name, profile)| profile.to_profile(name))
            .collect()
    }

    /// Generate a default configuration as TOML string
    pub fn default_toml() -> String {
        r#"# Trackbench Configuration

[runner]
# Backend adapter: "file" or "null"
backend = "file"
# Result file (defaults to bench_<backend>.csv)
# outfile = "bench_file.csv"
# Start workers from a fresh image instead of forking
use_spawn = false
# Give up on parallel workers after this long (uncomment to enable)
# worker_timeout = "10m"
# Refuse to run without --test_name
require_test_name = false

[output]
# Append started_at/ended_at to every result row
timestamps = false
# Storage root of the file backend
store_dir = "target/trackbench/store"

# Profiles expand one command line into several runs. Each entry of `sets`
# produces one run; an array value produces one run per element.
#
# [profiles.variants]
# description = "Compare three history shapes"
# sets = [
#     { test_variant = "small", num_history = 10 },
#     { test_variant = "large", num_history = 1000 },
#     { history_floats = [1, 10, 100] },
# ]
"#
        .to_string()
    }

    /// Parse duration string (e.g., "30", "90s", "500ms", "2m")
    pub fn parse_duration(s: &str) -> Result<std::time::Duration, ConfigError> {
        let invalid =
            |reason: String| ConfigError::Invalid(format!("worker_timeout: {}", reason));
        let s = s.trim();
        if s.is_empty() {
            return Err(invalid("empty duration string".to_string()));
        }

        let (num_part, unit_part) = s
            .char_indices()
            .find(|(_, c)| c.is_alphabetic())
            .map(|(i, _)| s.split_at(i))
            .unwrap_or((s, "s"));

        let value: f64 = num_part
            .trim()
            .parse()
            .map_err(|_| invalid(format!("invalid duration number '{}'", num_part)))?;
        if !value.is_finite() || value < 0.0 {
            return Err(invalid(format!("invalid duration '{}'", s)));
        }

        let seconds_per_unit = match unit_part.to_lowercase().as_str() {
            "ms" => 1e-3,
            "s" => 1.0,
            "m" | "min" => 60.0,
            "h" => 3600.0,
            _ => return Err(invalid(format!("unknown duration unit '{}'", unit_part))),
        };

        std::time::Duration::try_from_secs_f64(value * seconds_per_unit)
            .map_err(|_| invalid(format!("duration '{}' is out of range", s)))
    }
}
