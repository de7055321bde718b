//! Loop telemetry to application telemetry conversion
//!
//! EAR writes one row per loop sample. This module collapses them into one
//! row per (job, step, application, node):
//! - Counters are summed, everything else numeric is averaged
//! - Start and end times are derived from the loop timestamps
//! - Applications already present in an existing app file can be skipped

pub mod aggregate;
pub mod columns;
pub mod table;

pub use aggregate::{aggregate, AppRow, AppTable};
pub use table::{AppKey, Table};

use crate::config::AppCsvSettings;
use crate::error::{IoResultExt, Result};
use crate::progress::RowProgress;
use serde::Serialize;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::info;

/// Outcome of one conversion
#[derive(Debug, Clone, Serialize)]
pub struct ConversionSummary {
    /// Loop rows read from the input
    pub rows_read: usize,
    /// Loop rows dropped by the exclusion file
    pub rows_excluded: usize,
    /// Application rows written
    pub groups_written: usize,
    /// Metric columns in the output
    pub metric_columns: usize,
    /// Where the table was written
    pub output: PathBuf,
}

impl ConversionSummary {
    /// Print summary to stderr; stdout is reserved for `--print`
    pub fn print(&self) {
        let _ = self.write_to(std::io::stderr().lock());
    }

    /// Write the summary lines to `out`
    pub fn write_to<W: Write>(&self, mut out: W) -> std::io::Result<()> {
        writeln!(out, "Loop rows read:     {}", self.rows_read)?;
        writeln!(out, "Loop rows excluded: {}", self.rows_excluded)?;
        writeln!(out, "Applications:       {}", self.groups_written)?;
        writeln!(out, "Metric columns:     {}", self.metric_columns)?;
        writeln!(out, "Output:             {}", self.output.display())?;
        out.flush()
    }
}

/// Convert the loop file named in `settings` into an application file
pub fn convert_loop_file(settings: &AppCsvSettings) -> Result<ConversionSummary> {
    let progress = if settings.show_progress {
        RowProgress::new("Reading")
    } else {
        RowProgress::disabled()
    };

    let loops = match Table::read(&settings.loop_file, Some(&progress)) {
        Ok(table) => table,
        Err(e) => {
            progress.finish_error("read failed");
            return Err(e);
        }
    };
    progress.finish_success(&format!("{} loop rows", progress.rows()));

    let excluded: HashSet<AppKey> = match &settings.exclude_file {
        Some(path) => {
            let apps = Table::read(path, None)?;
            let keys = apps.key_set()?;
            info!("Excluding {} applications listed in {:?}", keys.len(), path);
            keys
        }
        None => HashSet::new(),
    };

    let apps = aggregate(&loops, &excluded)?;

    let output = settings.output_path();
    let file = File::create(&output).with_path(&output)?;
    apps.write(BufWriter::new(file), &output)?;
    info!("Wrote {} applications to {:?}", apps.rows.len(), output);

    if settings.print {
        let stdout = std::io::stdout();
        apps.write(stdout.lock(), &output)?;
    }

    Ok(ConversionSummary {
        rows_read: loops.rows.len(),
        rows_excluded: apps.excluded_rows,
        groups_written: apps.rows.len(),
        metric_columns: apps.metrics.len(),
        output,
    })
}
