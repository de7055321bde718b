//! Reading semicolon-delimited telemetry files

use super::columns::KEY_COLUMNS;
use crate::error::{CsvResultExt, EarToolsError, IoResultExt, Result};
use crate::progress::RowProgress;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::path::{Path, PathBuf};

/// Field delimiter of EAR telemetry files
pub const DELIMITER: u8 = b';';

/// Identity of one application run on one node.
///
/// Ordering follows the column order: job, step, application, node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct AppKey {
    /// Scheduler job id
    pub job_id: u64,
    /// Step id
    pub step_id: u64,
    /// Application id within the step
    pub app_id: u64,
    /// Node name
    pub node: String,
}

/// A fully loaded delimited file
#[derive(Debug, Clone)]
pub struct Table {
    /// Source file
    pub path: PathBuf,
    /// Header names in file order
    pub headers: Vec<String>,
    /// Data rows
    pub rows: Vec<csv::StringRecord>,
    index: HashMap<String, usize>,
}

impl Table {
    /// Build a table from in-memory parts
    pub fn new(path: impl Into<PathBuf>, headers: Vec<String>, rows: Vec<csv::StringRecord>) -> Self {
        let index = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.clone(), i))
            .collect();
        Self {
            path: path.into(),
            headers,
            rows,
            index,
        }
    }

    /// Read a `;`-delimited file with a header row
    pub fn read(path: &Path, progress: Option<&RowProgress>) -> Result<Self> {
        if !path.exists() {
            return Err(EarToolsError::NotFound(path.to_path_buf()));
        }
        let file = File::open(path).with_path(path)?;
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(DELIMITER)
            .trim(csv::Trim::All)
            .from_reader(file);

        let headers: Vec<String> = reader
            .headers()
            .with_path(path)?
            .iter()
            .map(|h| h.to_string())
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            rows.push(record.with_path(path)?);
            if let Some(progress) = progress {
                progress.inc();
            }
        }

        tracing::debug!("Read {} rows with {} columns from {:?}", rows.len(), headers.len(), path);
        Ok(Self::new(path, headers, rows))
    }

    /// Position of `column`, if present
    pub fn column(&self, column: &str) -> Option<usize> {
        self.index.get(column).copied()
    }

    /// Position of `column`, or a missing column error
    pub fn require(&self, column: &str) -> Result<usize> {
        self.column(column)
            .ok_or_else(|| EarToolsError::missing_column(&self.path, column))
    }

    /// Parse a numeric cell, reporting the column and 1-based data row on failure
    pub fn number(&self, row: usize, column: usize) -> Result<f64> {
        let raw = self.rows[row].get(column).unwrap_or("");
        raw.parse::<f64>().map_err(|_| EarToolsError::InvalidValue {
            path: self.path.clone(),
            column: self.headers[column].clone(),
            row: row + 1,
            value: raw.to_string(),
        })
    }

    /// Extracts application keys from rows of this table
    pub fn key_reader(&self) -> Result<KeyReader<'_>> {
        Ok(KeyReader {
            table: self,
            columns: [
                self.require(KEY_COLUMNS[0])?,
                self.require(KEY_COLUMNS[1])?,
                self.require(KEY_COLUMNS[2])?,
                self.require(KEY_COLUMNS[3])?,
            ],
        })
    }

    /// Every distinct application key in the table
    pub fn key_set(&self) -> Result<HashSet<AppKey>> {
        let keys = self.key_reader()?;
        (0..self.rows.len()).map(|row| keys.key(row)).collect()
    }
}

/// Resolved key column positions for one table
pub struct KeyReader<'a> {
    table: &'a Table,
    columns: [usize; 4],
}

impl KeyReader<'_> {
    /// Key of data row `row`
    pub fn key(&self, row: usize) -> Result<AppKey> {
        let id = |i: usize| -> Result<u64> {
            let column = self.columns[i];
            let value = self.table.number(row, column)?;
            if value < 0.0 || value.fract() != 0.0 {
                return Err(EarToolsError::InvalidValue {
                    path: self.table.path.clone(),
                    column: self.table.headers[column].clone(),
                    row: row + 1,
                    value: self.table.rows[row].get(column).unwrap_or("").to_string(),
                });
            }
            Ok(value as u64)
        };
        Ok(AppKey {
            job_id: id(0)?,
            step_id: id(1)?,
            app_id: id(2)?,
            node: self.table.rows[row]
                .get(self.columns[3])
                .unwrap_or("")
                .to_string(),
        })
    }
}
