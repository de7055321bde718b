//! Per-application aggregation of loop samples

use super::columns::{
    aggregation_for, is_metric_column, Aggregation, DERIVED_COLUMNS, ELAPSED_COLUMN, KEY_COLUMNS,
    TIMESTAMP_COLUMN,
};
use super::table::{AppKey, Table, DELIMITER};
use crate::error::{CsvResultExt, IoResultExt, Result};
use chrono::DateTime;
use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use std::path::Path;

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One output row: a group key plus its rendered cells
#[derive(Debug, Clone, PartialEq)]
pub struct AppRow {
    /// Group identity
    pub key: AppKey,
    /// Metric cells followed by the derived start/end cells
    pub values: Vec<String>,
}

/// Aggregated application table
#[derive(Debug, Clone, Default)]
pub struct AppTable {
    /// Metric column names, in output order
    pub metrics: Vec<String>,
    /// Rows ordered by key
    pub rows: Vec<AppRow>,
    /// Loop rows dropped because their key was in the exclusion set
    pub excluded_rows: usize,
}

impl AppTable {
    /// Full header: keys, metrics, then derived columns
    pub fn headers(&self) -> Vec<String> {
        KEY_COLUMNS
            .iter()
            .map(|c| c.to_string())
            .chain(self.metrics.iter().cloned())
            .chain(DERIVED_COLUMNS.iter().map(|c| c.to_string()))
            .collect()
    }

    /// Cell value by column name
    pub fn value(&self, row: usize, column: &str) -> Option<&str> {
        let row = self.rows.get(row)?;
        if let Some(i) = self.metrics.iter().position(|m| m == column) {
            return row.values.get(i).map(String::as_str);
        }
        let i = DERIVED_COLUMNS.iter().position(|c| *c == column)?;
        row.values.get(self.metrics.len() + i).map(String::as_str)
    }

    /// Write the table `;`-delimited with a header row
    pub fn write<W: Write>(&self, out: W, path: &Path) -> Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(DELIMITER)
            .from_writer(out);
        writer.write_record(self.headers()).with_path(path)?;
        for row in &self.rows {
            let key = &row.key;
            let mut record = vec![
                key.job_id.to_string(),
                key.step_id.to_string(),
                key.app_id.to_string(),
                key.node.clone(),
            ];
            record.extend(row.values.iter().cloned());
            writer.write_record(&record).with_path(path)?;
        }
        writer.flush().with_path(path)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct MetricColumn {
    name: String,
    index: usize,
    aggregation: Aggregation,
    numeric: bool,
}

#[derive(Debug)]
struct GroupState {
    sums: Vec<f64>,
    counts: Vec<usize>,
    first_text: Vec<Option<String>>,
    min_timestamp: f64,
    max_timestamp: f64,
    min_elapsed: f64,
}

impl GroupState {
    fn new(width: usize) -> Self {
        Self {
            sums: vec![0.0; width],
            counts: vec![0; width],
            first_text: vec![None; width],
            min_timestamp: f64::INFINITY,
            max_timestamp: f64::NEG_INFINITY,
            min_elapsed: f64::INFINITY,
        }
    }

    fn render(&self, metrics: &[MetricColumn]) -> Vec<String> {
        let mut values: Vec<String> = metrics
            .iter()
            .enumerate()
            .map(|(i, metric)| {
                if !metric.numeric {
                    return self.first_text[i].clone().unwrap_or_default();
                }
                if self.counts[i] == 0 {
                    return String::new();
                }
                match metric.aggregation {
                    Aggregation::Sum => format_number(self.sums[i]),
                    Aggregation::Mean => format_number(self.sums[i] / self.counts[i] as f64),
                }
            })
            .collect();

        let start = self.min_timestamp - self.min_elapsed;
        let end = self.max_timestamp;
        values.push(format_number(start));
        values.push(format_date(start));
        values.push(format_number(end));
        values.push(format_date(end));
        values
    }
}

/// Render a number without a trailing `.0` when it is integral
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Render epoch seconds as a UTC date; empty when out of range
pub fn format_date(seconds: f64) -> String {
    if !seconds.is_finite() {
        return String::new();
    }
    DateTime::from_timestamp(seconds.floor() as i64, 0)
        .map(|dt| dt.format(DATE_FORMAT).to_string())
        .unwrap_or_default()
}

/// Collapse loop rows into one row per application and node.
///
/// Rows whose key is in `excluded` are skipped.
pub fn aggregate(loops: &Table, excluded: &HashSet<AppKey>) -> Result<AppTable> {
    let keys = loops.key_reader()?;
    let timestamp = loops.require(TIMESTAMP_COLUMN)?;
    let elapsed = loops.require(ELAPSED_COLUMN)?;

    let mut kept = Vec::with_capacity(loops.rows.len());
    let mut excluded_rows = 0;
    for row in 0..loops.rows.len() {
        let key = keys.key(row)?;
        if excluded.contains(&key) {
            excluded_rows += 1;
        } else {
            kept.push((row, key));
        }
    }

    let mut metrics: Vec<MetricColumn> = loops
        .headers
        .iter()
        .enumerate()
        .filter(|(_, name)| is_metric_column(name))
        .map(|(index, name)| MetricColumn {
            name: name.clone(),
            index,
            aggregation: aggregation_for(name),
            numeric: kept.iter().all(|(row, _)| {
                let cell = loops.rows[*row].get(index).unwrap_or("");
                cell.is_empty() || cell.parse::<f64>().is_ok()
            }),
        })
        .collect();
    metrics.sort_by(|a, b| a.name.cmp(&b.name));
    metrics.dedup_by(|a, b| a.name == b.name);

    let mut groups: BTreeMap<AppKey, GroupState> = BTreeMap::new();
    for (row, key) in kept {
        let record = &loops.rows[row];
        let ts = loops.number(row, timestamp)?;
        let el = loops.number(row, elapsed)?;

        let state = groups
            .entry(key)
            .or_insert_with(|| GroupState::new(metrics.len()));
        state.min_timestamp = state.min_timestamp.min(ts);
        state.max_timestamp = state.max_timestamp.max(ts);
        state.min_elapsed = state.min_elapsed.min(el);

        for (i, metric) in metrics.iter().enumerate() {
            let cell = record.get(metric.index).unwrap_or("");
            if cell.is_empty() {
                continue;
            }
            if metric.numeric {
                if let Ok(value) = cell.parse::<f64>() {
                    state.sums[i] += value;
                    state.counts[i] += 1;
                }
            } else if state.first_text[i].is_none() {
                state.first_text[i] = Some(cell.to_string());
            }
        }
    }

    tracing::debug!(
        "Aggregated {} groups over {} metric columns ({} rows excluded)",
        groups.len(),
        metrics.len(),
        excluded_rows
    );

    let rows = groups
        .into_iter()
        .map(|(key, state)| AppRow {
            values: state.render(&metrics),
            key,
        })
        .collect();

    Ok(AppTable {
        metrics: metrics.into_iter().map(|m| m.name).collect(),
        rows,
        excluded_rows,
    })
}
