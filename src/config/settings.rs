//! Configuration settings for EAR tools
//!
//! Defines the CLI arguments, per-tool settings and their defaults.

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default EARD remote API port
pub const DEFAULT_EARD_PORT: u16 = 50001;

/// Default name of the generated cluster configuration file
pub const DEFAULT_CONF_FILE: &str = "earConf.txt";

/// Prefix given to application CSV files derived from loop CSV files
pub const APP_CSV_PREFIX: &str = "apps";

/// EAR tools - administration utilities for energy-aware HPC clusters
#[derive(Parser, Debug, Clone)]
#[command(name = "ear-tools")]
#[command(author = "EAR Tools Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Configuration wizards, telemetry post-processing and native API checks for EAR clusters")]
#[command(long_about = r#"
EAR tools bundles small administration utilities for clusters running the
EAR energy management daemons (EARD, EARDBD, EARGM).

Tools:
  - conf       Interactive wizard producing a full earConf.txt
  - eargm      Interactive wizard producing only the EARGM section
  - app-csv    Pivot per-loop telemetry rows into per-application rows
  - job-check  Send a job record through the native EARD remote API

Examples:
  ear-tools conf                                   # Full wizard, writes earConf.txt
  ear-tools conf --with-daemons -o /etc/ear/ear.conf
  ear-tools eargm --answers answers.txt            # Replay answers from a file
  ear-tools app-csv loops.csv --app-csv-file apps.csv
  ear-tools job-check --dependency-lib libcommon.so --api-lib libeard_rapi.so
"#)]
pub struct CliArgs {
    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,
}

/// Tools provided by the binary
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Create an application CSV file from a loop CSV file
    AppCsv {
        /// Loop CSV file (semicolon separated)
        #[arg(value_name = "LOOP_CSV_FILE")]
        loop_csv_file: PathBuf,

        /// Application CSV whose JOBID/STEPID/APPID/NODENAME rows are excluded
        #[arg(long, value_name = "PATH")]
        app_csv_file: Option<PathBuf>,

        /// Output file (default: apps_<LOOP_CSV_FILE> next to the input)
        #[arg(short = 'o', long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Also print the resulting table to stdout
        #[arg(long)]
        print: bool,
    },

    /// Build a complete cluster configuration file interactively
    Conf {
        /// Output configuration file
        #[arg(short = 'o', long, default_value = DEFAULT_CONF_FILE, value_name = "PATH")]
        output: PathBuf,

        /// Also ask for the database, EARD and EARDBD sections
        #[arg(long)]
        with_daemons: bool,

        /// Read answers from a file (one per line) instead of stdin
        #[arg(long, value_name = "PATH")]
        answers: Option<PathBuf>,

        /// Dump the collected cluster model as JSON
        #[arg(long, value_name = "PATH")]
        dump_json: Option<PathBuf>,
    },

    /// Build the EARGM section of the configuration interactively
    Eargm {
        /// Output file (default: stdout)
        #[arg(short = 'o', long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Read answers from a file (one per line) instead of stdin
        #[arg(long, value_name = "PATH")]
        answers: Option<PathBuf>,

        /// Dump the collected cluster model as JSON
        #[arg(long, value_name = "PATH")]
        dump_json: Option<PathBuf>,
    },

    /// Send a job description through the native EARD remote API
    JobCheck {
        /// Library loaded first, with its symbols made global
        #[arg(long, value_name = "PATH")]
        dependency_lib: PathBuf,

        /// Library exporting the remote API functions
        #[arg(long, value_name = "PATH")]
        api_lib: PathBuf,

        /// Directory used to resolve relative library paths
        #[arg(long, env = "EAR_TOOLS_LIB_DIR", value_name = "DIR")]
        lib_dir: Option<PathBuf>,

        /// Node running the EARD (default: local short hostname)
        #[arg(long, value_name = "HOST")]
        node: Option<String>,

        /// EARD remote API port
        #[arg(long, default_value_t = DEFAULT_EARD_PORT, value_name = "PORT")]
        port: u16,

        /// Skip the connect/disconnect calls
        #[arg(long)]
        no_connect: bool,

        /// Notifications to send
        #[arg(long, value_enum, default_value = "both")]
        action: JobAction,

        /// Job id (default: read from --job-id-var)
        #[arg(long, value_name = "ID")]
        job_id: Option<u64>,

        /// Environment variable holding the scheduler job id
        #[arg(long, default_value = "SLURM_JOB_ID", value_name = "VAR")]
        job_id_var: String,

        /// Step id
        #[arg(long, default_value = "0", value_name = "ID")]
        step_id: u64,

        /// Power policy name placed in the record
        #[arg(long, default_value = "", value_name = "NAME")]
        policy: String,

        /// Policy threshold placed in the record
        #[arg(long, default_value = "0", value_name = "TH")]
        threshold: f64,

        /// Energy tag placed in the record
        #[arg(long, default_value = "", value_name = "TAG")]
        energy_tag: String,

        /// Number of processes placed in the record
        #[arg(long, default_value = "0", value_name = "NUM")]
        procs: u64,
    },
}

/// Job notifications sent by `job-check`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum JobAction {
    /// Only notify a new job
    #[value(name = "new-job")]
    NewJob,
    /// Only notify the end of a job
    #[value(name = "end-job")]
    EndJob,
    /// New job followed by end job
    Both,
}

impl JobAction {
    /// Whether a new-job notification is sent
    pub fn sends_new_job(&self) -> bool {
        matches!(self, Self::NewJob | Self::Both)
    }

    /// Whether an end-job notification is sent
    pub fn sends_end_job(&self) -> bool {
        matches!(self, Self::EndJob | Self::Both)
    }
}

/// Which wizard is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WizardScope {
    /// Only the global manager questions and section
    Eargm,
    /// Every section of the cluster configuration file
    Cluster,
}

/// Settings for the loop-to-application CSV conversion
#[derive(Debug, Clone)]
pub struct AppCsvSettings {
    /// Loop CSV input
    pub loop_file: PathBuf,
    /// Optional file of application keys to exclude
    pub exclude_file: Option<PathBuf>,
    /// Explicit output path
    pub output: Option<PathBuf>,
    /// Echo the table to stdout
    pub print: bool,
    /// Show a spinner while reading
    pub show_progress: bool,
}

impl AppCsvSettings {
    /// Path the application CSV is written to
    pub fn output_path(&self) -> PathBuf {
        match &self.output {
            Some(path) => path.clone(),
            None => derived_app_path(&self.loop_file),
        }
    }
}

/// `dir/loops.csv` -> `dir/apps_loops.csv`
pub fn derived_app_path(loop_file: &Path) -> PathBuf {
    let name = loop_file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let file_name = format!("{}_{}", APP_CSV_PREFIX, name);
    match loop_file.parent() {
        Some(parent) => parent.join(file_name),
        None => PathBuf::from(file_name),
    }
}

/// Settings for the interactive wizards
#[derive(Debug, Clone)]
pub struct WizardSettings {
    /// Wizard flavour
    pub scope: WizardScope,
    /// Ask database and daemon questions (cluster scope only)
    pub with_daemons: bool,
    /// Output file; stdout when absent
    pub output: Option<PathBuf>,
    /// Answer file replacing stdin
    pub answers: Option<PathBuf>,
    /// JSON dump of the collected model
    pub dump_json: Option<PathBuf>,
}

impl Default for WizardSettings {
    fn default() -> Self {
        Self {
            scope: WizardScope::Cluster,
            with_daemons: false,
            output: Some(PathBuf::from(DEFAULT_CONF_FILE)),
            answers: None,
            dump_json: None,
        }
    }
}

/// Settings for the native API smoke test
#[derive(Debug, Clone)]
pub struct JobCheckSettings {
    /// Library loaded first with global symbols
    pub dependency_lib: PathBuf,
    /// Library exporting the API
    pub api_lib: PathBuf,
    /// Node to connect to; `None` skips connecting
    pub node: Option<String>,
    /// EARD port
    pub port: u16,
    /// Notifications to send
    pub action: JobAction,
    /// Job id override
    pub job_id: Option<u64>,
    /// Scheduler job id variable
    pub job_id_var: String,
    /// Step id
    pub step_id: u64,
    /// Policy name
    pub policy: String,
    /// Policy threshold
    pub threshold: f64,
    /// Energy tag
    pub energy_tag: String,
    /// Process count
    pub procs: u64,
}

impl Default for JobCheckSettings {
    fn default() -> Self {
        Self {
            dependency_lib: PathBuf::new(),
            api_lib: PathBuf::new(),
            node: None,
            port: DEFAULT_EARD_PORT,
            action: JobAction::Both,
            job_id: None,
            job_id_var: "SLURM_JOB_ID".to_string(),
            step_id: 0,
            policy: String::new(),
            threshold: 0.0,
            energy_tag: String::new(),
            procs: 0,
        }
    }
}

/// Resolve `lib` against `lib_dir` unless it is already absolute
pub fn resolve_library(lib: &Path, lib_dir: Option<&Path>) -> PathBuf {
    match lib_dir {
        Some(dir) if lib.is_relative() => dir.join(lib),
        _ => lib.to_path_buf(),
    }
}

/// Local hostname truncated at the first dot
pub fn short_hostname() -> Result<String, String> {
    let name = hostname::get()
        .map_err(|e| format!("Cannot read hostname: {}", e))?
        .to_string_lossy()
        .to_string();
    Ok(name.split('.').next().unwrap_or_default().to_string())
}

impl AppCsvSettings {
    /// Create settings from CLI arguments
    pub fn from_cli(args: &CliArgs) -> Result<Self, String> {
        match &args.command {
            Commands::AppCsv {
                loop_csv_file,
                app_csv_file,
                output,
                print,
            } => Ok(Self {
                loop_file: loop_csv_file.clone(),
                exclude_file: app_csv_file.clone(),
                output: output.clone(),
                print: *print,
                show_progress: !args.quiet,
            }),
            _ => Err("Not an app-csv invocation".to_string()),
        }
    }
}

impl WizardSettings {
    /// Create settings from CLI arguments
    pub fn from_cli(args: &CliArgs) -> Result<Self, String> {
        match &args.command {
            Commands::Conf {
                output,
                with_daemons,
                answers,
                dump_json,
            } => Ok(Self {
                scope: WizardScope::Cluster,
                with_daemons: *with_daemons,
                output: Some(output.clone()),
                answers: answers.clone(),
                dump_json: dump_json.clone(),
            }),
            Commands::Eargm {
                output,
                answers,
                dump_json,
            } => Ok(Self {
                scope: WizardScope::Eargm,
                with_daemons: false,
                output: output.clone(),
                answers: answers.clone(),
                dump_json: dump_json.clone(),
            }),
            _ => Err("Not a wizard invocation".to_string()),
        }
    }
}

impl JobCheckSettings {
    /// Create settings from CLI arguments
    pub fn from_cli(args: &CliArgs) -> Result<Self, String> {
        let Commands::JobCheck {
            dependency_lib,
            api_lib,
            lib_dir,
            node,
            port,
            no_connect,
            action,
            job_id,
            job_id_var,
            step_id,
            policy,
            threshold,
            energy_tag,
            procs,
        } = &args.command
        else {
            return Err("Not a job-check invocation".to_string());
        };

        if !threshold.is_finite() || *threshold < 0.0 {
            return Err(format!("Invalid policy threshold: {}", threshold));
        }

        let node = if *no_connect {
            None
        } else {
            match node {
                Some(n) => Some(n.clone()),
                None => Some(short_hostname()?),
            }
        };

        Ok(Self {
            dependency_lib: resolve_library(dependency_lib, lib_dir.as_deref()),
            api_lib: resolve_library(api_lib, lib_dir.as_deref()),
            node,
            port: *port,
            action: *action,
            job_id: *job_id,
            job_id_var: job_id_var.clone(),
            step_id: *step_id,
            policy: policy.clone(),
            threshold: *threshold,
            energy_tag: energy_tag.clone(),
            procs: *procs,
        })
    }
}
