//! Dataset and table loading for tsadbench.
//!
//! Two kinds of CSV input pass through here:
//!
//! | Input | Loader | Shape |
//! |-------|--------|-------|
//! | Labelled time series (one per dataset) | [`DatasetLoader::load_csv`] | numeric feature columns, trailing `Label` |
//! | Result / benchmark tables | [`Table::from_path`] | one row per dataset, keyed by `file` |
//!
//! Missing cells follow the usual CSV conventions (`""`, `NA`, `NaN`,
//! `null`, ...). Dataset rows containing one are dropped; table cells holding
//! one read as NaN.

use ndarray::{Array1, Array2, ArrayView1};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tsadbench_core::{Result, TsadError};

/// Name of the ground-truth column in dataset files.
pub const LABEL_COLUMN: &str = "Label";

/// Name of the dataset key column in result and benchmark tables.
pub const FILE_COLUMN: &str = "file";

/// Cell spellings treated as a missing value.
const MISSING_MARKERS: [&str; 19] = [
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Whether a raw CSV cell denotes a missing value.
pub fn is_missing(cell: &str) -> bool {
    MISSING_MARKERS.contains(&cell.trim())
}

/// Parse a table cell as a number, NaN when missing or non-numeric.
pub fn parse_cell(cell: &str) -> f64 {
    if is_missing(cell) {
        return f64::NAN;
    }
    cell.trim().parse::<f64>().unwrap_or(f64::NAN)
}

/// One labelled time series, cleaned and split.
#[derive(Debug, Clone)]
pub struct Dataset {
    /// File name (no directory), used as the dataset key everywhere.
    pub file: String,
    /// Feature matrix, rows x features.
    pub features: Array2<f64>,
    /// Integer labels, 1 = anomalous.
    pub labels: Array1<i64>,
    /// Rows discarded because they held a missing value.
    pub dropped_rows: usize,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.features.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.features.nrows() == 0
    }

    pub fn num_features(&self) -> usize {
        self.features.ncols()
    }

    /// Number of rows labelled anomalous.
    pub fn num_anomalies(&self) -> usize {
        self.labels.iter().filter(|&&l| l == 1).count()
    }

    /// Fraction of rows labelled anomalous.
    pub fn anomaly_ratio(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        self.num_anomalies() as f64 / self.len() as f64
    }

    /// The first feature column, input of the window-length heuristic.
    pub fn first_feature(&self) -> ArrayView1<'_, f64> {
        self.features.column(0)
    }
}

/// Loads dataset files from disk.
pub struct DatasetLoader;

impl DatasetLoader {
    /// List the `*.csv` files of `dir`, sorted by file name.
    ///
    /// # Errors
    ///
    /// Returns [`TsadError::InputMissing`] if `dir` does not exist, or an I/O
    /// error if it cannot be read.
    pub fn list_csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
        if !dir.is_dir() {
            return Err(TsadError::InputMissing {
                what: "Dataset directory".to_string(),
                path: dir.to_path_buf(),
            });
        }
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "csv") {
                files.push(path);
            }
        }
        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(files)
    }

    /// Load one labelled time series.
    ///
    /// Rows with any missing cell are dropped. Every column but the last is a
    /// feature; labels are read from the `Label` column and truncated to
    /// integers.
    ///
    /// # Errors
    ///
    /// Returns [`TsadError::Dataset`] if the file has no `Label` column, no
    /// feature column, a non-numeric cell, or no rows left after cleaning.
    pub fn load_csv(path: &Path) -> Result<Dataset> {
        let file = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)?;
        let headers = reader.headers()?.clone();
        if headers.len() < 2 {
            return Err(TsadError::Dataset(format!(
                "{file}: expected at least one feature column and a `{LABEL_COLUMN}` column"
            )));
        }
        let label_idx = headers
            .iter()
            .position(|h| h.trim() == LABEL_COLUMN)
            .ok_or_else(|| {
                TsadError::Dataset(format!("{file}: missing `{LABEL_COLUMN}` column"))
            })?;
        let num_features = headers.len() - 1;

        let mut values: Vec<f64> = Vec::new();
        let mut labels: Vec<i64> = Vec::new();
        let mut dropped_rows = 0usize;

        for (row_idx, record) in reader.records().enumerate() {
            let record = record?;
            if record.len() != headers.len() || record.iter().any(is_missing) {
                dropped_rows += 1;
                continue;
            }
            for (col_idx, cell) in record.iter().take(num_features).enumerate() {
                values.push(parse_number(cell, &file, row_idx, &headers[col_idx])?);
            }
            let label = parse_number(&record[label_idx], &file, row_idx, LABEL_COLUMN)?;
            labels.push(label as i64);
        }

        if labels.is_empty() {
            return Err(TsadError::Dataset(format!(
                "{file}: no rows left after dropping missing values"
            )));
        }

        let features = Array2::from_shape_vec((labels.len(), num_features), values)
            .map_err(|e| TsadError::Dataset(format!("{file}: {e}")))?;

        Ok(Dataset {
            file,
            features,
            labels: Array1::from(labels),
            dropped_rows,
        })
    }
}

fn parse_number(cell: &str, file: &str, row_idx: usize, column: &str) -> Result<f64> {
    cell.trim().parse::<f64>().map_err(|_| {
        TsadError::Dataset(format!(
            "{file}: non-numeric value {cell:?} in column `{column}` at data row {}",
            row_idx + 1
        ))
    })
}

/// A CSV table held as strings, with numeric access by column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Build a table from headers and rows. Short rows are padded with
    /// empty cells.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, String::new());
                row
            })
            .collect();
        Self { headers, rows }
    }

    /// Read a table from a CSV file with a header row.
    ///
    /// # Errors
    ///
    /// Returns [`TsadError::InputMissing`] if the file does not exist, or a
    /// CSV error if it cannot be parsed.
    pub fn from_path(path: &Path, what: &str) -> Result<Self> {
        if !path.is_file() {
            return Err(TsadError::InputMissing {
                what: what.to_string(),
                path: path.to_path_buf(),
            });
        }
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)?;
        let headers = reader.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            rows.push(record?.iter().map(str::to_string).collect());
        }
        Ok(Self::new(headers, rows))
    }

    /// Write the table as CSV, overwriting `path`.
    pub fn write(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of the column called `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Raw cells of the column called `name`.
    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|r| r[idx].as_str()).collect())
    }

    /// Cells of the column called `name` parsed as numbers (NaN if missing).
    pub fn numeric_column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|r| parse_cell(&r[idx])).collect())
    }

    /// The `file` column, required for keyed operations.
    ///
    /// # Errors
    ///
    /// Returns [`TsadError::Dataset`] naming the table if the column is absent.
    pub fn file_column(&self, what: &str) -> Result<Vec<&str>> {
        self.column(FILE_COLUMN).ok_or_else(|| {
            TsadError::Dataset(format!("{what} has no `{FILE_COLUMN}` column"))
        })
    }

    /// Distinct values of the `file` column.
    pub fn file_set(&self, what: &str) -> Result<HashSet<String>> {
        Ok(self
            .file_column(what)?
            .into_iter()
            .map(str::to_string)
            .collect())
    }
}
