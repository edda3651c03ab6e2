//! Benchmark comparison: joins this system's results with a multi-method
//! benchmark table, ranks every method by mean score and tests this system
//! against the strongest competitors.
//!
//! # Output
//!
//! ```text
//! ============================================================
//! RANKING BY MEAN VUS-PR (higher is better)
//! ============================================================
//! Rank   Method                         Mean VUS-PR     Std
//! ------------------------------------------------------------
//! 1      Sub-PCA                        0.4213          0.2931
//! 2      KShapeAD                       0.4001          0.3012
//! 3      PCA                            0.3712          0.2810  <- PCA
//! ```

pub mod plots;

use crate::datasets::{Table, FILE_COLUMN};
use crate::metrics::{self, PValueMethod, Significance, Summary, WilcoxonResult};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tsadbench_core::{PipelineConfig, Result, TsadError};

/// Benchmark columns that describe the dataset rather than a method.
pub const METADATA_COLUMNS: [&str; 5] = [
    FILE_COLUMN,
    "category",
    "point_anomaly",
    "seq_anomaly",
    "num_anomaly",
];

/// Ranked methods considered for significance testing.
pub const SIGNIFICANCE_POOL: usize = 10;
/// Competing methods tested against this system.
pub const SIGNIFICANCE_TOP_N: usize = 5;
/// Competing methods shown in the ranking chart.
pub const RANKING_CHART_TOP_N: usize = 15;

/// Load the results table (required) and the benchmark table (optional).
///
/// # Errors
///
/// Returns [`TsadError::InputMissing`] when the results table does not exist.
pub fn load_inputs(config: &PipelineConfig) -> Result<(Table, Option<Table>)> {
    let results = Table::from_path(&config.results_csv(), "Results table")?;
    tracing::info!(rows = results.len(), "Loaded results table");

    let benchmark_path = &config.paths.benchmark_path;
    let benchmark = match Table::from_path(benchmark_path, "Benchmark table") {
        Ok(table) => {
            tracing::info!(
                rows = table.len(),
                columns = table.headers().len(),
                "Loaded benchmark table"
            );
            Some(table)
        }
        Err(TsadError::InputMissing { path, .. }) => {
            tracing::warn!(path = %path.display(), "Benchmark table not found");
            None
        }
        Err(e) => return Err(e),
    };
    Ok((results, benchmark))
}

/// How far a comparison run got with the benchmark table.
#[derive(Debug, Clone, PartialEq)]
pub enum BenchmarkOutcome {
    /// No benchmark table at the configured path.
    Missing,
    /// The tables share no dataset.
    NoCommonFiles,
    Compared {
        common_files: usize,
        our_rank: Option<usize>,
    },
}

/// What a comparison run printed and wrote.
#[derive(Debug, Clone)]
pub struct Report {
    /// Rows of the results table.
    pub results_rows: usize,
    pub benchmark: BenchmarkOutcome,
    /// Charts and combined table, in the order they were written.
    pub written: Vec<PathBuf>,
    /// Standalone statistics of the primary metric.
    pub summary: Summary,
}

/// Compare the run's results with the benchmark table and print the
/// standalone statistics.
///
/// A missing benchmark table or an empty intersection is reported and the
/// standalone statistics are still produced. Charts that fail to render are
/// logged and left out of [`Report::written`].
///
/// # Errors
///
/// Returns [`TsadError::InputMissing`] when the results table does not
/// exist, or any error from reading tables or writing the combined table.
pub fn run(config: &PipelineConfig) -> Result<Report> {
    let method = &config.method.name;
    let metric = &config.primary_metric;

    println!("{}", "=".repeat(80));
    println!("{} BENCHMARK COMPARISON TOOL", method.to_uppercase());
    println!("{}", "=".repeat(80));
    println!("Loading data...");

    let (results, benchmark) = load_inputs(config)?;
    println!("Loaded {method} results: {} datasets", results.len());

    let mut written = Vec::new();
    let outcome = match benchmark {
        Some(benchmark) => {
            println!(
                "Loaded benchmark results: {} datasets, {} methods",
                benchmark.len(),
                benchmark.headers().len().saturating_sub(1)
            );
            compare(config, &results, &benchmark, &mut written)?
        }
        None => {
            println!(
                "Warning: Benchmark results not found at {}",
                config.paths.benchmark_path.display()
            );
            println!("Comparison with other methods will be limited.");
            println!("Skipping benchmark comparison (no data)");
            BenchmarkOutcome::Missing
        }
    };

    let summary = standalone_summary(&results, metric)?;
    print_standalone(method, metric, results.len(), &summary);

    println!("\n{}", "=".repeat(80));
    println!("COMPARISON COMPLETE!");
    println!("{}", "=".repeat(80));
    if !written.is_empty() {
        println!("\nResults saved to: {}", config.paths.comparison_dir.display());
        println!("\nGenerated files:");
        for path in &written {
            if let Some(name) = path.file_name() {
                println!("  - {}", name.to_string_lossy());
            }
        }
    }
    println!("{}", "=".repeat(80));

    Ok(Report {
        results_rows: results.len(),
        benchmark: outcome,
        written,
        summary,
    })
}

fn compare(
    config: &PipelineConfig,
    results: &Table,
    benchmark: &Table,
    written: &mut Vec<PathBuf>,
) -> Result<BenchmarkOutcome> {
    let method = &config.method.name;
    let metric = &config.primary_metric;

    println!("\n{}", "=".repeat(80));
    println!("COMPARISON WITH BENCHMARK METHODS");
    println!("{}", "=".repeat(80));

    let comparison = match Comparison::build(results, benchmark, method, metric) {
        Ok(comparison) => comparison,
        Err(TsadError::EmptyIntersection) => {
            println!("\nCommon datasets: 0");
            println!("Warning: No common datasets found. Check filename formats.");
            tracing::warn!("Results and benchmark tables share no dataset");
            return Ok(BenchmarkOutcome::NoCommonFiles);
        }
        Err(e) => return Err(e),
    };
    println!("\nCommon datasets: {}", comparison.common_files());

    let ranking = comparison.ranking();
    ranking.print(metric);

    let tests = comparison.significance(&ranking);
    print_significance(&tests, method);

    let out_dir = &config.paths.comparison_dir;
    std::fs::create_dir_all(out_dir)?;

    println!("\nGenerating comparison plots...");
    for output in plots::render_all(&comparison, &ranking, out_dir) {
        match output {
            Ok(path) => {
                println!("Saved: {}", path.display());
                written.push(path);
            }
            Err(e) => {
                println!("Warning: {e}");
                tracing::warn!(error = %e, "Plot not rendered");
            }
        }
    }

    let combined = combined_path(out_dir);
    comparison.write_combined(&combined)?;
    println!("\nSaved combined results: {}", combined.display());
    written.push(combined);

    Ok(BenchmarkOutcome::Compared {
        common_files: comparison.common_files(),
        our_rank: ranking.our_rank(),
    })
}

/// `<comparison_dir>/combined_results.csv`.
pub fn combined_path(comparison_dir: &Path) -> PathBuf {
    comparison_dir.join("combined_results.csv")
}

/// Benchmark rows on the common datasets, with this system's column added.
#[derive(Debug, Clone)]
pub struct Comparison {
    method: String,
    primary_metric: String,
    methods: Vec<String>,
    combined: Table,
}

impl Comparison {
    /// Join `results` and `benchmark` on the `file` column.
    ///
    /// The combined table keeps benchmark row order and every benchmark
    /// column. This system's primary-metric scores go in a column named
    /// `method`, replacing a benchmark column of the same name.
    ///
    /// # Errors
    ///
    /// Returns [`TsadError::EmptyIntersection`] when no file is in both
    /// tables, or [`TsadError::Dataset`] if a table lacks a needed column.
    pub fn build(
        results: &Table,
        benchmark: &Table,
        method: &str,
        primary_metric: &str,
    ) -> Result<Self> {
        let result_files = results.file_column("Results table")?;
        let result_scores = results.numeric_column(primary_metric).ok_or_else(|| {
            TsadError::Dataset(format!("Results table has no `{primary_metric}` column"))
        })?;
        let mut ours: HashMap<&str, f64> = HashMap::new();
        for (file, score) in result_files.iter().zip(&result_scores) {
            ours.entry(*file).or_insert(*score);
        }

        let benchmark_files = benchmark.file_column("Benchmark table")?;
        let mut headers: Vec<String> = benchmark.headers().to_vec();
        let replace_idx = benchmark.column_index(method);
        if replace_idx.is_none() {
            headers.push(method.to_string());
        }

        let mut seen: HashSet<&str> = HashSet::new();
        let mut rows = Vec::new();
        for (row, file) in benchmark.rows().iter().zip(&benchmark_files) {
            let Some(score) = ours.get(file) else {
                continue;
            };
            if !seen.insert(*file) {
                tracing::warn!(file = %file, "Duplicate benchmark row ignored");
                continue;
            }
            let mut row = row.clone();
            let cell = metrics::format_cell(*score);
            match replace_idx {
                Some(idx) => row[idx] = cell,
                None => row.push(cell),
            }
            rows.push(row);
        }

        if rows.is_empty() {
            return Err(TsadError::EmptyIntersection);
        }

        let methods = headers
            .iter()
            .filter(|h| !METADATA_COLUMNS.contains(&h.as_str()) && h.as_str() != method)
            .cloned()
            .chain(std::iter::once(method.to_string()))
            .collect();

        Ok(Self {
            method: method.to_string(),
            primary_metric: primary_metric.to_string(),
            methods,
            combined: Table::new(headers, rows),
        })
    }

    /// This system's method name.
    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn primary_metric(&self) -> &str {
        &self.primary_metric
    }

    /// Every method column, competitors first and this system last.
    pub fn methods(&self) -> &[String] {
        &self.methods
    }

    /// Number of datasets in both tables.
    pub fn common_files(&self) -> usize {
        self.combined.len()
    }

    pub fn combined(&self) -> &Table {
        &self.combined
    }

    /// Per-dataset scores of `method`, in combined-table row order.
    pub fn scores(&self, method: &str) -> Vec<f64> {
        self.combined
            .numeric_column(method)
            .unwrap_or_else(|| vec![f64::NAN; self.combined.len()])
    }

    /// Rank every method by mean score, highest first.
    ///
    /// The sort is stable, so equal means keep column order. Methods with no
    /// scores at all rank last.
    pub fn ranking(&self) -> Ranking {
        let mut entries: Vec<MethodStats> = self
            .methods
            .iter()
            .map(|m| {
                let scores = self.scores(m);
                MethodStats {
                    method: m.clone(),
                    mean: metrics::mean(&scores),
                    std: metrics::sample_std(&scores),
                }
            })
            .collect();
        entries.sort_by(|a, b| match (a.mean.is_nan(), b.mean.is_nan()) {
            (false, false) => b.mean.total_cmp(&a.mean),
            (true, false) => std::cmp::Ordering::Greater,
            (false, true) => std::cmp::Ordering::Less,
            (true, true) => std::cmp::Ordering::Equal,
        });
        Ranking {
            ours: self.method.clone(),
            entries,
        }
    }

    /// Paired signed-rank tests against the top competitors of `ranking`.
    ///
    /// Scores are paired per dataset; a dataset missing either score is left
    /// out of that pair.
    pub fn significance(&self, ranking: &Ranking) -> Vec<SignificanceResult> {
        let ours = self.scores(&self.method);
        ranking
            .top_competitors(SIGNIFICANCE_POOL, SIGNIFICANCE_TOP_N)
            .into_iter()
            .map(|competitor| {
                let theirs = self.scores(competitor);
                let (a, b): (Vec<f64>, Vec<f64>) = ours
                    .iter()
                    .zip(&theirs)
                    .filter(|(x, y)| !x.is_nan() && !y.is_nan())
                    .map(|(x, y)| (*x, *y))
                    .unzip();
                let mean_ours = metrics::mean(&a);
                let mean_theirs = metrics::mean(&b);
                SignificanceResult {
                    method: competitor.to_string(),
                    n_pairs: a.len(),
                    mean_ours,
                    mean_theirs,
                    mean_difference: mean_ours - mean_theirs,
                    test: metrics::wilcoxon_signed_rank(&a, &b),
                }
            })
            .collect()
    }

    /// Write the combined table.
    pub fn write_combined(&self, path: &Path) -> Result<()> {
        self.combined.write(path)
    }
}

/// Mean and spread of one method over the common datasets.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodStats {
    pub method: String,
    pub mean: f64,
    pub std: f64,
}

/// Methods ordered by descending mean score.
#[derive(Debug, Clone)]
pub struct Ranking {
    ours: String,
    entries: Vec<MethodStats>,
}

impl Ranking {
    pub fn entries(&self) -> &[MethodStats] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 1-indexed rank of `method`.
    pub fn rank_of(&self, method: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.method == method)
            .map(|idx| idx + 1)
    }

    /// 1-indexed rank of this system.
    pub fn our_rank(&self) -> Option<usize> {
        self.rank_of(&self.ours)
    }

    /// Number of methods ranked below this system.
    pub fn outperforms(&self) -> usize {
        self.our_rank().map_or(0, |rank| self.entries.len() - rank)
    }

    /// The first `n` competitors among the `pool` best-ranked methods.
    pub fn top_competitors(&self, pool: usize, n: usize) -> Vec<&str> {
        self.entries
            .iter()
            .take(pool)
            .filter(|e| e.method != self.ours)
            .take(n)
            .map(|e| e.method.as_str())
            .collect()
    }

    /// The first `n` competitors in rank order.
    pub fn competitors(&self, n: usize) -> Vec<&MethodStats> {
        self.entries
            .iter()
            .filter(|e| e.method != self.ours)
            .take(n)
            .collect()
    }

    /// Print the ranking table, this system's position marked.
    pub fn print(&self, primary_metric: &str) {
        println!("\n{}", "=".repeat(60));
        println!("RANKING BY MEAN {primary_metric} (higher is better)");
        println!("{}", "=".repeat(60));
        println!(
            "{:<6} {:<30} {:<15} Std",
            "Rank",
            "Method",
            format!("Mean {primary_metric}")
        );
        println!("{}", "-".repeat(60));
        for (idx, entry) in self.entries.iter().enumerate() {
            let marker = if entry.method == self.ours {
                format!("  <- {}", self.ours)
            } else {
                String::new()
            };
            println!(
                "{:<6} {:<30} {:<15.4} {:.4}{}",
                idx + 1,
                entry.method,
                entry.mean,
                entry.std,
                marker
            );
        }
        println!("{}", "=".repeat(60));
        if let Some(rank) = self.our_rank() {
            println!(
                "\n{} ranks #{} out of {} methods",
                self.ours,
                rank,
                self.entries.len()
            );
            println!("{} outperforms {} methods", self.ours, self.outperforms());
        }
    }
}

/// Outcome of testing this system against one competitor.
#[derive(Debug, Clone, PartialEq)]
pub struct SignificanceResult {
    pub method: String,
    /// Datasets where both methods have a score.
    pub n_pairs: usize,
    pub mean_ours: f64,
    pub mean_theirs: f64,
    /// `mean_ours - mean_theirs` over the paired datasets.
    pub mean_difference: f64,
    /// `None` when every paired difference is zero.
    pub test: Option<WilcoxonResult>,
}

impl SignificanceResult {
    pub fn significance(&self) -> Option<Significance> {
        self.test.map(|t| Significance::from_p_value(t.p_value))
    }

    /// One-line reading of the result.
    pub fn interpretation(&self, ours: &str) -> String {
        match self.significance() {
            None => "Not testable (no non-zero paired differences)".to_string(),
            Some(s) if s.is_significant() && self.mean_difference > 0.0 => {
                format!("{ours} is significantly better")
            }
            Some(s) if s.is_significant() => {
                format!("{} is significantly better", self.method)
            }
            Some(_) => "No significant difference".to_string(),
        }
    }
}

/// Print the significance block for every tested competitor.
pub fn print_significance(results: &[SignificanceResult], ours: &str) {
    println!("\n{}", "=".repeat(80));
    println!("STATISTICAL COMPARISON (Wilcoxon signed-rank test)");
    println!("{}", "=".repeat(80));
    for result in results {
        println!("\n{ours} vs {}:", result.method);
        println!("  Paired datasets: {}", result.n_pairs);
        println!("  Mean difference: {:+.4}", result.mean_difference);
        if let Some(test) = &result.test {
            let approx = match test.method {
                PValueMethod::Exact => "",
                PValueMethod::NormalApproximation => " (normal approx.)",
            };
            println!(
                "  p-value: {:.4} {}{approx}",
                test.p_value,
                Significance::from_p_value(test.p_value).marker()
            );
        }
        println!("  Interpretation: {}", result.interpretation(ours));
    }
    println!("\n* p<0.05, ** p<0.01, *** p<0.001, ns=not significant");
}

/// Descriptive statistics of this system's primary metric.
///
/// # Errors
///
/// Returns [`TsadError::Dataset`] when the results table lacks the column.
pub fn standalone_summary(results: &Table, primary_metric: &str) -> Result<Summary> {
    let scores = results.numeric_column(primary_metric).ok_or_else(|| {
        TsadError::Dataset(format!("Results table has no `{primary_metric}` column"))
    })?;
    Ok(Summary::of(&scores))
}

/// Print the standalone statistics block.
pub fn print_standalone(method: &str, primary_metric: &str, rows: usize, summary: &Summary) {
    println!("\n{}", "=".repeat(80));
    println!("{} STANDALONE STATISTICS", method.to_uppercase());
    println!("{}", "=".repeat(80));
    println!("Total datasets processed: {rows}");
    println!(
        "Mean {primary_metric}: {:.4} +/- {:.4}",
        summary.mean, summary.std
    );
    println!("Median {primary_metric}: {:.4}", summary.median);
    println!("Best {primary_metric}: {:.4}", summary.max);
    println!("Worst {primary_metric}: {:.4}", summary.min);
}
