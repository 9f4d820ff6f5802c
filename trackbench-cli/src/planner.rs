//! Run Planner
//!
//! Expands the base configuration with the selected profile and checks the
//! required identity fields of every resulting run before anything executes.
//! A plan that comes back `Ok` never fails on configuration once execution
//! starts.

use trackbench_core::{BenchmarkConfig, ConfigError, ProfileRegistry};

/// Ordered runs produced from one command line
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    /// Profile the runs were expanded from (empty for a plain run)
    pub profile: String,
    /// One configuration per ExpandedRun, in execution order
    pub runs: Vec<BenchmarkConfig>,
}

impl ExecutionPlan {
    /// Number of runs
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    /// Whether the plan has no runs
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Backend sessions summed over every run
    pub fn total_invocations(&self) -> u64 {
        self.runs.iter().map(BenchmarkConfig::total_invocations).sum()
    }

    /// Dry-run listing
    pub fn describe(&self) -> String {
        let mut out = String::from("Trackbench Plan:\n");
        for (i, run) in self.runs.iter().enumerate() {
            out.push_str(&format!(
                "├── [{}] {} (sequential={}, parallel={}, history={}, mode={})\n",
                i + 1,
                run_label(run),
                run.num_sequential,
                run.num_parallel,
                run.num_history,
                run.mode,
            ));
        }
        out.push_str(&format!(
            "{} run(s), {} backend session(s).\n",
            self.len(),
            self.total_invocations()
        ));
        out
    }
}

/// Short label for logs and progress output
pub fn run_label(config: &BenchmarkConfig) -> String {
    let identity = &config.identity;
    let mut parts = Vec::new();
    for part in [
        &identity.test_name,
        &identity.test_profile,
        &identity.test_variant,
    ] {
        if !part.is_empty() {
            parts.push(part.as_str());
        }
    }
    if parts.is_empty() {
        "run".to_string()
    } else {
        parts.join("/")
    }
}

/// Build the execution plan for `profile_name`
pub fn build_plan(
    registry: &ProfileRegistry,
    base: &BenchmarkConfig,
    profile_name: &str,
    require_test_name: bool,
) -> Result<ExecutionPlan, ConfigError> {
    let runs = registry.expand(base, profile_name)?;
    if require_test_name && runs.iter().any(|run| run.identity.test_name.is_empty()) {
        return Err(ConfigError::MissingIdentity("test_name"));
    }

    Ok(ExecutionPlan {
        profile: profile_name.to_string(),
        runs,
    })
}
