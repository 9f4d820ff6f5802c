#![warn(missing_docs)]
//! Trackbench CLI Library
//!
//! Command-line front end of the harness: flag parsing, `trackbench.toml`
//! discovery, profile expansion, and execution with optional process fan-out.
//! The same binary doubles as the spawned worker (`--trackbench-worker`).
//!
//! # Example
//!
//! ```ignore
//! fn main() {
//!     if let Err(e) = trackbench_cli::run() {
//!         eprintln!("Error: {:#}", e);
//!         std::process::exit(trackbench_cli::exit_code(&e));
//!     }
//! }
//! ```

mod config;
mod executor;
mod planner;
mod start_method;
mod supervisor;
mod worker;

pub use config::*;
pub use executor::{
    ExecutionError, ExecutionOptions, ExecutionSummary, Executor, Orchestrator, RunError,
    RunSummary,
};
pub use planner::{ExecutionPlan, build_plan, run_label};
pub use start_method::{StartMethod, set_start_method, start_method};
pub use supervisor::*;
pub use worker::run_worker_mode;

use clap::{Args, Parser, Subcommand};
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use trackbench_backends::backend_by_name;
use trackbench_core::{BenchmarkConfig, ConfigError, Identity, Mode, ProfileRegistry};
use trackbench_report::{OutputFormat, ResultWriter, read_rows, render_rows};

/// Trackbench CLI arguments
#[derive(Parser, Debug)]
#[command(name = "trackbench")]
#[command(
    author,
    version,
    about = "Trackbench - client-side latency benchmarks for telemetry logging backends"
)]
pub struct Cli {
    /// Optional subcommand (Run, Profiles, Results, Init); defaults to Run
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Benchmark parameters
    #[command(flatten)]
    pub run: RunArgs,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Internal: Run as worker process (used by the supervisor)
    #[arg(long = "trackbench-worker", hide = true)]
    pub trackbench_worker: bool,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the benchmark (default)
    Run,
    /// List registered profiles and their expansion size
    Profiles,
    /// Print the rows of a result file
    Results {
        /// Result file to read
        path: PathBuf,
        /// Output format: human, json, csv
        #[arg(long, default_value = "human")]
        format: String,
    },
    /// Print a default trackbench.toml
    Init,
}

/// Flags describing one benchmark invocation
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Free-form test name
    #[arg(long = "test_name", alias = "test-name", default_value = "", global = true)]
    pub test_name: String,

    /// Profile to expand (empty runs the flags as given)
    #[arg(long = "test_profile", alias = "test-profile", default_value = "", global = true)]
    pub test_profile: String,

    /// Variant label
    #[arg(long = "test_variant", alias = "test-variant", default_value = "", global = true)]
    pub test_variant: String,

    /// Tracking server version
    #[arg(long = "server_version", alias = "server-version", default_value = "", global = true)]
    pub server_version: String,

    /// Tracking server flavour
    #[arg(long = "server_type", alias = "server-type", default_value = "", global = true)]
    pub server_type: String,

    /// Client library version (defaults to the backend adapter's version)
    #[arg(long = "client_version", alias = "client-version", default_value = "", global = true)]
    pub client_version: String,

    /// Client flavour
    #[arg(long = "client_type", alias = "client-type", default_value = "", global = true)]
    pub client_type: String,

    /// Backend connection mode: online or offline
    #[arg(long, default_value = "offline", global = true)]
    pub mode: Mode,

    /// Sessions per process
    #[arg(long = "num_sequential", alias = "num-sequential", default_value_t = 1, global = true)]
    pub num_sequential: u32,

    /// Worker processes (values <= 1 run in-process)
    #[arg(long = "num_parallel", alias = "num-parallel", default_value_t = 1, global = true)]
    pub num_parallel: u32,

    /// Records logged per session
    #[arg(long = "num_history", alias = "num-history", default_value_t = 1, global = true)]
    pub num_history: u32,

    /// Float metrics per record
    #[arg(long = "history_floats", alias = "history-floats", default_value_t = 0, global = true)]
    pub history_floats: u32,

    /// Integer metrics per record
    #[arg(long = "history_ints", alias = "history-ints", default_value_t = 0, global = true)]
    pub history_ints: u32,

    /// String values per record
    #[arg(long = "history_strings", alias = "history-strings", default_value_t = 0, global = true)]
    pub history_strings: u32,

    /// Tables per record
    #[arg(long = "history_tables", alias = "history-tables", default_value_t = 0, global = true)]
    pub history_tables: u32,

    /// Images per record
    #[arg(long = "history_images", alias = "history-images", default_value_t = 0, global = true)]
    pub history_images: u32,

    /// Side length of each square RGB image
    #[arg(
        long = "history_images_dim",
        alias = "history-images-dim",
        default_value_t = 16,
        global = true
    )]
    pub history_images_dim: u32,

    /// Backend project
    #[arg(long = "project_name", alias = "project-name", default_value = "default_project", global = true)]
    pub project_name: String,

    /// Backend workspace
    #[arg(long, default_value = "default_workspace", global = true)]
    pub workspace: String,

    /// Start workers from a fresh image instead of forking
    #[arg(long = "use_spawn", alias = "use-spawn", global = true)]
    pub use_spawn: bool,

    /// Backend adapter: file or null (default from trackbench.toml, else file)
    #[arg(long, global = true)]
    pub backend: Option<String>,

    /// Result file (default: bench_<backend>.csv)
    #[arg(long, global = true)]
    pub outfile: Option<PathBuf>,

    /// Storage root of the file backend
    #[arg(long = "store_dir", alias = "store-dir", global = true)]
    pub store_dir: Option<String>,

    /// Give up on parallel workers after this long (e.g. 30, 90s, 5m)
    #[arg(long = "worker_timeout", alias = "worker-timeout", global = true)]
    pub worker_timeout: Option<String>,

    /// Append started_at/ended_at to every row
    #[arg(long, global = true)]
    pub timestamps: bool,

    /// Print the expanded runs without executing them
    #[arg(long = "dry_run", alias = "dry-run", global = true)]
    pub dry_run: bool,
}

impl RunArgs {
    /// Base configuration described by the flags
    pub fn base_config(&self, backend: &str, store_dir: &str) -> BenchmarkConfig {
        BenchmarkConfig {
            identity: Identity {
                test_name: self.test_name.clone(),
                test_profile: self.test_profile.clone(),
                test_variant: self.test_variant.clone(),
                client_version: self.client_version.clone(),
                client_type: self.client_type.clone(),
                server_version: self.server_version.clone(),
                server_type: self.server_type.clone(),
            },
            mode: self.mode,
            num_sequential: self.num_sequential,
            num_parallel: self.num_parallel,
            num_history: self.num_history,
            history_floats: self.history_floats,
            history_ints: self.history_ints,
            history_strings: self.history_strings,
            history_tables: self.history_tables,
            history_images: self.history_images,
            history_images_dim: self.history_images_dim,
            project_name: self.project_name.clone(),
            workspace: self.workspace.clone(),
            backend: backend.to_string(),
            store_dir: store_dir.to_string(),
        }
    }
}

/// Run the Trackbench CLI with the process arguments.
pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    run_with_cli(cli)
}

/// Run the Trackbench CLI with pre-parsed arguments.
pub fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    init_logging(cli.verbose);

    if cli.trackbench_worker {
        return run_worker_mode();
    }

    let config = TrackbenchConfig::discover()?.unwrap_or_default();

    match cli.command {
        Some(Commands::Init) => {
            print!("{}", TrackbenchConfig::default_toml());
            Ok(())
        }
        Some(Commands::Profiles) => list_profiles(&config),
        Some(Commands::Results { ref path, ref format }) => show_results(path, format),
        Some(Commands::Run) | None => run_benchmarks(&cli.run, &config),
    }
}

/// Exit status for an error returned by [`run`]: 2 for configuration
/// problems, 1 for everything else
pub fn exit_code(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<ConfigError>().is_some() {
        2
    } else {
        1
    }
}

/// Install the stderr subscriber (`RUST_LOG` wins over the default filter)
fn init_logging(verbose: bool) {
    let default = if verbose {
        "trackbench=debug"
    } else {
        "trackbench=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn registry(config: &TrackbenchConfig) -> Result<ProfileRegistry, ConfigError> {
    ProfileRegistry::with_builtins(config.user_profiles()?)
}

fn list_profiles(config: &TrackbenchConfig) -> anyhow::Result<()> {
    let registry = registry(config)?;
    println!("Trackbench Profiles:");
    for profile in registry.iter() {
        println!(
            "├── {} ({} run(s)): {}",
            profile.name(),
            profile.override_sets().len(),
            profile.description()
        );
    }
    println!("{} profiles registered.", registry.len());
    Ok(())
}

fn show_results(path: &std::path::Path, format: &str) -> anyhow::Result<()> {
    let format: OutputFormat = format.parse().map_err(anyhow::Error::msg)?;
    let rows = read_rows(path)?;
    let output = render_rows(&rows, format).map_err(anyhow::Error::msg)?;
    print!("{}", output);
    Ok(())
}

fn run_benchmarks(args: &RunArgs, config: &TrackbenchConfig) -> anyhow::Result<()> {
    // Layering: built-in defaults → trackbench.toml → CLI flags
    let backend_name = args
        .backend
        .clone()
        .unwrap_or_else(|| config.runner.backend.clone());
    let store_dir = args
        .store_dir
        .clone()
        .unwrap_or_else(|| config.output.store_dir.clone());
    let backend = backend_by_name(&backend_name)?;
    let registry = registry(config)?;

    let mut base = args.base_config(&backend_name, &store_dir);
    if base.identity.client_version.is_empty() {
        base.identity.client_version = backend.client_version();
    }

    let plan = build_plan(
        &registry,
        &base,
        &args.test_profile,
        config.runner.require_test_name,
    )?;

    if args.dry_run {
        print!("{}", plan.describe());
        return Ok(());
    }

    let worker_timeout = args
        .worker_timeout
        .as_deref()
        .or(config.runner.worker_timeout.as_deref())
        .map(TrackbenchConfig::parse_duration)
        .transpose()?;
    set_start_method(StartMethod::from_use_spawn(
        args.use_spawn || config.runner.use_spawn,
    ))?;

    let outfile = args
        .outfile
        .clone()
        .or_else(|| config.runner.outfile.as_ref().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(format!("bench_{}.csv", backend_name)));
    let writer = ResultWriter::open(&outfile, args.timestamps || config.output.timestamps)?;

    info!(
        backend = %backend_name,
        runs = plan.len(),
        method = %start_method(),
        outfile = %outfile.display(),
        "starting benchmark"
    );

    let orchestrator = Orchestrator::new(backend.as_ref()).with_worker_timeout(worker_timeout);
    let options = ExecutionOptions {
        show_progress: std::io::stderr().is_terminal(),
    };
    let summary = Executor::new(orchestrator, writer, options).execute(&plan)?;

    println!(
        "{} run(s), {} backend session(s), {} row(s) appended to {}",
        summary.runs,
        summary.invocations,
        summary.rows,
        outfile.display()
    );
    Ok(())
}
