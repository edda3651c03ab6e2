//! Records produced by a batch run and the tables they are written to.

use crate::datasets::Table;
use crate::metrics::{format_cell, Summary};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tsadbench_core::{MetricSet, Result};

/// Leading columns of the results table, before the metric columns.
pub const METADATA_HEADERS: [&str; 7] = [
    "file",
    "time",
    "data_length",
    "num_features",
    "num_anomalies",
    "anomaly_ratio",
    "sliding_window",
];

/// Outcome of one successfully processed dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub file: String,
    /// Detector wall-clock time in seconds.
    pub time: f64,
    pub data_length: usize,
    pub num_features: usize,
    pub num_anomalies: usize,
    pub anomaly_ratio: f64,
    pub sliding_window: usize,
    pub metrics: MetricSet,
}

impl ResultRecord {
    /// Value of a metric, NaN if the evaluator did not report it.
    pub fn metric(&self, name: &str) -> f64 {
        self.metrics.get(name).unwrap_or(f64::NAN)
    }

    fn metadata_cells(&self) -> [String; 7] {
        [
            self.file.clone(),
            self.time.to_string(),
            self.data_length.to_string(),
            self.num_features.to_string(),
            self.num_anomalies.to_string(),
            self.anomaly_ratio.to_string(),
            self.sliding_window.to_string(),
        ]
    }
}

/// A dataset that could not be processed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub file: String,
    pub error: String,
}

/// Build the results table: metadata columns, then every metric name in the
/// order first seen across `records`. Metric names that collide with a
/// metadata column are left out.
pub fn results_table(records: &[ResultRecord]) -> Table {
    let mut metric_names: Vec<String> = Vec::new();
    for record in records {
        for name in record.metrics.names() {
            if !METADATA_HEADERS.contains(&name) && !metric_names.iter().any(|n| n == name) {
                metric_names.push(name.to_string());
            }
        }
    }

    let headers = METADATA_HEADERS
        .iter()
        .map(|h| h.to_string())
        .chain(metric_names.iter().cloned())
        .collect();
    let rows = records
        .iter()
        .map(|record| {
            record
                .metadata_cells()
                .into_iter()
                .chain(metric_names.iter().map(|n| format_cell(record.metric(n))))
                .collect()
        })
        .collect();
    Table::new(headers, rows)
}

/// Write the failure table (`file`, `error`) to `path`.
pub fn write_failures_csv(failures: &[FailureRecord], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for failure in failures {
        writer.serialize(failure)?;
    }
    writer.flush()?;
    Ok(())
}

/// Per-column descriptive statistics of every numeric column of `table`.
///
/// A column counts as numeric when at least one cell parses; the `file`
/// column never does.
pub fn summary_table(table: &Table) -> Table {
    let headers = std::iter::once("column")
        .chain(Summary::field_names())
        .map(str::to_string)
        .collect();
    let rows = table
        .headers()
        .iter()
        .filter(|h| h.as_str() != crate::datasets::FILE_COLUMN)
        .filter_map(|h| {
            let values = table.numeric_column(h)?;
            if values.iter().all(|v| v.is_nan()) {
                return None;
            }
            let mut row = vec![h.clone()];
            row.extend(Summary::of(&values).to_row());
            Some(row)
        })
        .collect();
    Table::new(headers, rows)
}

/// Everything a batch run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Records added in this run, in processing order.
    pub results: Vec<ResultRecord>,
    pub failures: Vec<FailureRecord>,
    /// Files skipped because they were already journaled with a score
    /// artifact on disk.
    pub skipped: usize,
    pub total_files: usize,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
}

impl RunOutcome {
    /// Files attempted in this run (not skipped).
    pub fn attempted(&self) -> usize {
        self.results.len() + self.failures.len()
    }
}
