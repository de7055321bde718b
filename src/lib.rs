//! # EAR tools - administration utilities for energy-aware HPC clusters
//!
//! Small tools for sites running the EAR energy management framework:
//!
//! - **Configuration wizards**: interactive questions about the cluster that
//!   produce either the EARGM section or a complete `earConf.txt`
//! - **Telemetry post-processing**: pivot per-loop CSV rows into one row per
//!   application with averaged metrics
//! - **Native API check**: load the EARD remote API library and send a job
//!   record through it
//!
//! ## Loop CSV conversion
//!
//! ```no_run
//! use ear_tools::config::AppCsvSettings;
//! use ear_tools::telemetry::convert_loop_file;
//! use std::path::PathBuf;
//!
//! let settings = AppCsvSettings {
//!     loop_file: PathBuf::from("loops.csv"),
//!     exclude_file: None,
//!     output: None,
//!     print: false,
//!     show_progress: true,
//! };
//!
//! let summary = convert_loop_file(&settings).unwrap();
//! summary.print();
//! ```
//!
//! ## Scripted wizard
//!
//! ```no_run
//! use ear_tools::config::WizardScope;
//! use ear_tools::wizard::{collect, render, Prompter};
//! use std::io::Cursor;
//!
//! let answers = Cursor::new(b"1\nn\n4\n500\n300\nn\nn\n\n".to_vec());
//! let mut prompter = Prompter::new(answers, std::io::sink());
//!
//! let model = collect(&mut prompter, WizardScope::Eargm, false).unwrap();
//! print!("{}", render(&model, WizardScope::Eargm));
//! ```
//!
//! ## Job notification check
//!
//! ```no_run
//! use ear_tools::config::JobCheckSettings;
//! use ear_tools::ffi::{build_request, run_job_check, NativeEndpoint};
//! use std::path::PathBuf;
//!
//! let settings = JobCheckSettings {
//!     dependency_lib: PathBuf::from("/opt/ear/lib/libcommon.so"),
//!     api_lib: PathBuf::from("/opt/ear/lib/libeard_rapi.so"),
//!     node: Some("node001".to_string()),
//!     ..Default::default()
//! };
//!
//! let request = build_request(&settings).unwrap();
//! let mut endpoint = NativeEndpoint::load(&settings.dependency_lib, &settings.api_lib).unwrap();
//! let report = run_job_check(&settings, request, &mut endpoint).unwrap();
//! report.print_summary();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod ffi;
pub mod progress;
pub mod telemetry;
pub mod wizard;

// Re-export commonly used types
pub use config::{AppCsvSettings, JobCheckSettings, WizardScope, WizardSettings};
pub use error::{EarToolsError, Result};
pub use ffi::{run_job_check, JobCheckReport};
pub use progress::RowProgress;
pub use telemetry::{convert_loop_file, ConversionSummary};
pub use wizard::{run_wizard, WizardModel, WizardOutcome};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use ear_tools::prelude::*;
    //! ```

    pub use crate::config::{AppCsvSettings, JobAction, JobCheckSettings, WizardScope, WizardSettings};
    pub use crate::error::{EarToolsError, Result};
    pub use crate::ffi::{build_request, run_job_check, JobCheckReport, JobEndpoint, NativeEndpoint};
    pub use crate::progress::RowProgress;
    pub use crate::telemetry::{aggregate, convert_loop_file, AppKey, AppTable, Table};
    pub use crate::wizard::{collect, render, run_wizard, Prompter, WizardModel};
}
