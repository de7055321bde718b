//! EAR tools CLI
//!
//! Configuration wizards, loop telemetry conversion and a native API check
//! for clusters running EAR.

use clap::Parser;
use ear_tools::config::{AppCsvSettings, CliArgs, Commands, JobCheckSettings, WizardSettings};
use ear_tools::error::{EarToolsError, Result};
use ear_tools::ffi::{build_request, run_job_check, NativeEndpoint};
use ear_tools::telemetry::convert_loop_file;
use ear_tools::wizard::{check_output, run_wizard};
use tracing::debug;
use tracing_subscriber::EnvFilter;

fn main() {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Initialize logging; RUST_LOG wins over -v/-q
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level(args.verbose, args.quiet)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Handle result
    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn default_level(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        return "error";
    }
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn run(args: CliArgs) -> Result<()> {
    debug!("{:?}", args.command);
    match &args.command {
        Commands::AppCsv { .. } => cmd_app_csv(&args),
        Commands::Conf { .. } | Commands::Eargm { .. } => cmd_wizard(&args),
        Commands::JobCheck { .. } => cmd_job_check(&args),
    }
}

fn cmd_app_csv(args: &CliArgs) -> Result<()> {
    let settings = AppCsvSettings::from_cli(args).map_err(EarToolsError::ConfigError)?;
    let summary = convert_loop_file(&settings)?;

    if !args.quiet {
        summary.print();
    }
    Ok(())
}

fn cmd_wizard(args: &CliArgs) -> Result<()> {
    let settings = WizardSettings::from_cli(args).map_err(EarToolsError::ConfigError)?;
    check_output(&settings)?;

    let outcome = run_wizard(&settings)?;

    if !args.quiet {
        if let Some(path) = &outcome.output {
            eprintln!("Configuration written to {}", path.display());
        }
    }
    Ok(())
}

fn cmd_job_check(args: &CliArgs) -> Result<()> {
    let settings = JobCheckSettings::from_cli(args).map_err(EarToolsError::ConfigError)?;
    let request = build_request(&settings)?;
    let mut endpoint = NativeEndpoint::load(&settings.dependency_lib, &settings.api_lib)?;

    let report = run_job_check(&settings, request, &mut endpoint)?;

    if !args.quiet {
        report.print_summary();
    }

    if !report.is_success() {
        std::process::exit(1);
    }

    Ok(())
}
