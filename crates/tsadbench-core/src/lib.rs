//! Core types, traits, and errors for tsadbench
//!
//! This crate holds the pieces shared by the batch runner, the benchmark
//! comparator and the collaborator bridge: the run configuration, the metric
//! and detector-output data types, the three collaborator traits behind which
//! the external anomaly-detection library sits, and the error type.

use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Metric names
// ---------------------------------------------------------------------------

/// Volume under the precision-recall surface. The primary ranking metric.
pub const METRIC_VUS_PR: &str = "VUS-PR";
/// Volume under the ROC surface.
pub const METRIC_VUS_ROC: &str = "VUS-ROC";
/// Affiliation precision.
pub const METRIC_AFFILIATION_PRECISION: &str = "Affiliation_Precision";
/// Affiliation recall.
pub const METRIC_AFFILIATION_RECALL: &str = "Affiliation_Recall";

/// Metrics every evaluator response must carry.
pub const REQUIRED_METRICS: [&str; 4] = [
    METRIC_VUS_PR,
    METRIC_VUS_ROC,
    METRIC_AFFILIATION_PRECISION,
    METRIC_AFFILIATION_RECALL,
];

// ---------------------------------------------------------------------------
// Determinism
// ---------------------------------------------------------------------------

/// Seed and determinism flags handed to the detector once per run.
///
/// The external library seeds its general-purpose RNG, the array RNG and,
/// when a GPU is present, the accelerator RNG from `seed`. `deterministic`
/// additionally disables non-deterministic accelerator kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Determinism {
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_true")]
    pub deterministic: bool,
}

fn default_seed() -> u64 {
    2024
}

fn default_true() -> bool {
    true
}

impl Default for Determinism {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            deterministic: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Detector types
// ---------------------------------------------------------------------------

/// Hyperparameters passed to the unsupervised detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DetectorParams {
    /// Number of principal components. `None` lets the library pick (MLE).
    pub n_components: Option<usize>,
    /// Whether to whiten the projected components.
    pub whiten: bool,
}

/// Raw output of a detector invocation, before contract validation.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectorOutput {
    /// A flat numeric array, one score per input row.
    Scores(Vec<f64>),
    /// Anything else the detector returned.
    Malformed(serde_json::Value),
}

impl DetectorOutput {
    /// Validate the output against the detector contract.
    ///
    /// # Errors
    ///
    /// Returns [`TsadError::DetectorContract`] if the output is not a numeric
    /// array or does not hold exactly `expected_len` scores.
    pub fn into_scores(self, expected_len: usize) -> Result<Array1<f64>> {
        match self {
            DetectorOutput::Scores(scores) if scores.len() == expected_len => {
                Ok(Array1::from(scores))
            }
            DetectorOutput::Scores(scores) => Err(TsadError::DetectorContract(format!(
                "expected {} scores, got {}",
                expected_len,
                scores.len()
            ))),
            DetectorOutput::Malformed(value) => Err(TsadError::DetectorContract(format!(
                "detector returned non-array output: {}",
                truncate_for_display(&value.to_string(), 200)
            ))),
        }
    }
}

fn truncate_for_display(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Metric set
// ---------------------------------------------------------------------------

/// Ordered metric name/value pairs as returned by the evaluator.
///
/// Insertion order is kept so result tables list metrics in the order the
/// evaluator produced them. NaN values serialize as `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    from = "Vec<(String, Option<f64>)>",
    into = "Vec<(String, Option<f64>)>"
)]
pub struct MetricSet {
    entries: Vec<(String, f64)>,
}

impl MetricSet {
    /// Create an empty metric set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a metric, replacing any existing value under the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Look up a metric by name.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    /// Metric names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// Name/value pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check that every name in `required` is present.
    ///
    /// # Errors
    ///
    /// Returns [`TsadError::MissingMetric`] naming the first absent metric.
    pub fn require(&self, required: &[&str]) -> Result<()> {
        match required.iter().find(|name| self.get(name).is_none()) {
            Some(missing) => Err(TsadError::MissingMetric((*missing).to_string())),
            None => Ok(()),
        }
    }
}

impl FromIterator<(String, f64)> for MetricSet {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        let mut set = MetricSet::new();
        for (name, value) in iter {
            set.insert(name, value);
        }
        set
    }
}

impl From<Vec<(String, Option<f64>)>> for MetricSet {
    fn from(pairs: Vec<(String, Option<f64>)>) -> Self {
        pairs
            .into_iter()
            .map(|(n, v)| (n, v.unwrap_or(f64::NAN)))
            .collect()
    }
}

impl From<MetricSet> for Vec<(String, Option<f64>)> {
    fn from(set: MetricSet) -> Self {
        set.entries
            .into_iter()
            .map(|(n, v)| (n, if v.is_nan() { None } else { Some(v) }))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// The external unsupervised anomaly detector.
pub trait AnomalyDetector {
    /// Detector backend name, for logs.
    fn name(&self) -> &str;

    /// Apply the run's seed and determinism flags.
    ///
    /// Called exactly once per run, before the first [`detect`] call.
    ///
    /// [`detect`]: AnomalyDetector::detect
    fn initialize(&mut self, determinism: &Determinism) -> Result<()>;

    /// Score every row of `data` (rows x features) with the named method.
    fn detect(
        &self,
        method: &str,
        data: ArrayView2<'_, f64>,
        params: &DetectorParams,
    ) -> Result<DetectorOutput>;
}

/// The external sliding-window length heuristic.
pub trait WindowEstimator {
    /// Estimate the dominant period of `series` at the given rank.
    fn find_length_rank(&self, series: ArrayView1<'_, f64>, rank: usize) -> Result<usize>;
}

/// The external evaluation-metrics library.
pub trait MetricsEvaluator {
    /// Compute the metric set for one dataset's scores.
    fn evaluate(
        &self,
        scores: ArrayView1<'_, f64>,
        labels: ArrayView1<'_, i64>,
        sliding_window: usize,
    ) -> Result<MetricSet>;
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Top-level configuration shared by all three binaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Input and output locations.
    #[serde(default)]
    pub paths: PathsConfig,
    /// Detection method and hyperparameters.
    #[serde(default)]
    pub method: MethodConfig,
    /// Seed handed to the detector before the first detection.
    #[serde(default)]
    pub determinism: Determinism,
    /// Sync the result journal every this many successful records.
    #[serde(default = "default_checkpoint_every")]
    pub checkpoint_every: usize,
    /// Metric used for ranking and summary statistics.
    #[serde(default = "default_primary_metric")]
    pub primary_metric: String,
    /// External library bridge process.
    #[serde(default)]
    pub bridge: BridgeConfig,
    /// Notebook viewer launched by the quick-start wrapper.
    #[serde(default)]
    pub notebook: NotebookConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_checkpoint_every() -> usize {
    10
}

fn default_primary_metric() -> String {
    METRIC_VUS_PR.to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            method: MethodConfig::default(),
            determinism: Determinism::default(),
            checkpoint_every: default_checkpoint_every(),
            primary_metric: default_primary_metric(),
            bridge: BridgeConfig::default(),
            notebook: NotebookConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Reject configurations the runner cannot honour.
    ///
    /// # Errors
    ///
    /// Returns [`TsadError::Config`] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.checkpoint_every == 0 {
            return Err(TsadError::Config(
                "checkpoint_every must be at least 1".to_string(),
            ));
        }
        if self.method.name.trim().is_empty() {
            return Err(TsadError::Config("method.name must not be empty".to_string()));
        }
        if self.method.window_rank == 0 {
            return Err(TsadError::Config(
                "method.window_rank must be at least 1".to_string(),
            ));
        }
        if self.primary_metric.trim().is_empty() {
            return Err(TsadError::Config("primary_metric must not be empty".to_string()));
        }
        match self.logging.format.as_str() {
            "text" | "json" => Ok(()),
            other => Err(TsadError::Config(format!(
                "logging.format must be `text` or `json`, got `{other}`"
            ))),
        }
    }

    /// Directory holding one `.npy` score artifact per dataset.
    pub fn score_dir(&self) -> PathBuf {
        self.paths.save_dir.join("scores")
    }

    /// Directory holding result, failure and summary tables.
    pub fn metrics_dir(&self) -> PathBuf {
        self.paths.save_dir.join("metrics")
    }

    /// Append-only pipeline log file.
    pub fn log_file(&self) -> PathBuf {
        self.paths
            .save_dir
            .join(format!("{}_pipeline.log", self.method.name))
    }

    /// Final results table written by the batch runner.
    pub fn results_csv(&self) -> PathBuf {
        self.metrics_dir()
            .join(format!("{}_all_results.csv", self.method.name))
    }

    /// Failure table written by the batch runner.
    pub fn failures_csv(&self) -> PathBuf {
        self.metrics_dir()
            .join(format!("{}_failed_files.csv", self.method.name))
    }

    /// Aggregate statistics table written by the batch runner.
    pub fn summary_csv(&self) -> PathBuf {
        self.metrics_dir()
            .join(format!("{}_summary_report.csv", self.method.name))
    }

    /// Durable journal of result records.
    pub fn journal_path(&self) -> PathBuf {
        self.metrics_dir()
            .join(format!("{}_results.journal.jsonl", self.method.name))
    }
}

/// Input and output locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory of labelled time-series CSV files.
    #[serde(default = "default_dataset_dir")]
    pub dataset_dir: PathBuf,
    /// Root of the scores, metrics and log outputs.
    #[serde(default = "default_save_dir")]
    pub save_dir: PathBuf,
    /// Pre-existing multi-method benchmark table.
    #[serde(default = "default_benchmark_path")]
    pub benchmark_path: PathBuf,
    /// Output directory of the comparator.
    #[serde(default = "default_comparison_dir")]
    pub comparison_dir: PathBuf,
}

fn default_dataset_dir() -> PathBuf {
    PathBuf::from("../Datasets/TSB-AD-U/")
}

fn default_save_dir() -> PathBuf {
    PathBuf::from("./eval/PCA_pipeline/")
}

fn default_benchmark_path() -> PathBuf {
    PathBuf::from("../benchmark_exp/benchmark_eval_results/uni_mergedTable_VUS-PR.csv")
}

fn default_comparison_dir() -> PathBuf {
    PathBuf::from("./eval/PCA_pipeline/metrics/comparisons/")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            dataset_dir: default_dataset_dir(),
            save_dir: default_save_dir(),
            benchmark_path: default_benchmark_path(),
            comparison_dir: default_comparison_dir(),
        }
    }
}

/// Detection method identity and hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodConfig {
    /// Method identifier understood by the external library.
    #[serde(default = "default_method_name")]
    pub name: String,
    /// Number of principal components; `None` selects automatically.
    #[serde(default)]
    pub n_components: Option<usize>,
    /// Whiten the projected components.
    #[serde(default)]
    pub whiten: bool,
    /// Rank passed to the window-length heuristic.
    #[serde(default = "default_window_rank")]
    pub window_rank: usize,
}

fn default_method_name() -> String {
    "PCA".to_string()
}

fn default_window_rank() -> usize {
    1
}

impl Default for MethodConfig {
    fn default() -> Self {
        Self {
            name: default_method_name(),
            n_components: None,
            whiten: false,
            window_rank: default_window_rank(),
        }
    }
}

impl MethodConfig {
    /// Hyperparameters in the shape the detector expects.
    pub fn detector_params(&self) -> DetectorParams {
        DetectorParams {
            n_components: self.n_components,
            whiten: self.whiten,
        }
    }
}

/// Child process that fronts the external library.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Interpreter or executable to launch.
    #[serde(default = "default_bridge_program")]
    pub program: String,
    /// Extra arguments placed before the script path.
    #[serde(default)]
    pub args: Vec<String>,
    /// Bridge script. `None` uses the script bundled with the bridge crate.
    #[serde(default)]
    pub script: Option<PathBuf>,
}

fn default_bridge_program() -> String {
    "python3".to_string()
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            program: default_bridge_program(),
            args: Vec::new(),
            script: None,
        }
    }
}

/// Interactive notebook launched after a successful pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotebookConfig {
    #[serde(default = "default_notebook_program")]
    pub program: String,
    #[serde(default = "default_notebook_args")]
    pub args: Vec<String>,
}

fn default_notebook_program() -> String {
    "jupyter".to_string()
}

fn default_notebook_args() -> Vec<String> {
    vec![
        "notebook".to_string(),
        "PCA_Statistical_Analysis.ipynb".to_string(),
    ]
}

impl Default for NotebookConfig {
    fn default() -> Self {
        Self {
            program: default_notebook_program(),
            args: default_notebook_args(),
        }
    }
}

impl NotebookConfig {
    /// The full command line, for display.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format: `text` (human-readable) or `json` (structured).
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Core error types.
#[derive(thiserror::Error, Debug)]
pub enum TsadError {
    /// A required input table or directory does not exist.
    #[error("{what} not found at {}", .path.display())]
    InputMissing {
        /// Human-readable name of the missing input.
        what: String,
        /// Path that was looked up.
        path: PathBuf,
    },

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV read or write error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A dataset file is structurally unusable.
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// The detector returned something other than a per-row score array.
    #[error("Detector contract violation: {0}")]
    DetectorContract(String),

    /// The external library bridge failed.
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    /// The evaluator omitted a required metric.
    #[error("Evaluator did not return required metric `{0}`")]
    MissingMetric(String),

    /// Result and benchmark tables share no dataset filename.
    #[error("No common datasets between results and benchmark tables")]
    EmptyIntersection,

    /// Score artifact could not be written or read.
    #[error("Score artifact error: {0}")]
    Artifact(String),

    /// Serialization / deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Plot rendering error.
    #[error("Plot error: {0}")]
    Plot(String),
}

/// Convenience alias for `std::result::Result<T, TsadError>`.
pub type Result<T> = std::result::Result<T, TsadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detector_output_scores_pass_validation() {
        let output = DetectorOutput::Scores(vec![0.1, 0.2, 0.3]);
        let scores = output.into_scores(3).unwrap();
        assert_eq!(scores.len(), 3);
        assert!((scores[2] - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_detector_output_length_mismatch() {
        let output = DetectorOutput::Scores(vec![0.1, 0.2]);
        let err = output.into_scores(3).unwrap_err();
        assert!(matches!(err, TsadError::DetectorContract(_)));
        assert!(err.to_string().contains("expected 3 scores, got 2"));
    }

    #[test]
    fn test_detector_output_malformed() {
        let output = DetectorOutput::Malformed(serde_json::json!({"oops": true}));
        let err = output.into_scores(1).unwrap_err();
        assert!(matches!(err, TsadError::DetectorContract(_)));
        assert!(err.to_string().contains("non-array"));
    }

    #[test]
    fn test_metric_set_keeps_insertion_order() {
        let mut set = MetricSet::new();
        set.insert("VUS-PR", 0.4);
        set.insert("AUC-PR", 0.3);
        set.insert("VUS-PR", 0.5);
        let names: Vec<&str> = set.names().collect();
        assert_eq!(names, vec!["VUS-PR", "AUC-PR"]);
        assert_eq!(set.get("VUS-PR"), Some(0.5));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_metric_set_require() {
        let set: MetricSet = vec![
            (METRIC_VUS_PR.to_string(), 0.1),
            (METRIC_VUS_ROC.to_string(), 0.2),
            (METRIC_AFFILIATION_PRECISION.to_string(), 0.3),
        ]
        .into_iter()
        .collect();
        let err = set.require(&REQUIRED_METRICS).unwrap_err();
        assert!(matches!(err, TsadError::MissingMetric(ref m) if m == METRIC_AFFILIATION_RECALL));
    }

    #[test]
    fn test_metric_set_nan_serializes_as_null() {
        let set: MetricSet = vec![("a".to_string(), f64::NAN), ("b".to_string(), 1.5)]
            .into_iter()
            .collect();
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"[["a",null],["b",1.5]]"#);
        let back: MetricSet = serde_json::from_str(&json).unwrap();
        assert!(back.get("a").unwrap().is_nan());
        assert_eq!(back.get("b"), Some(1.5));
    }

    #[test]
    fn test_config_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.method.name, "PCA");
        assert_eq!(config.method.n_components, None);
        assert!(!config.method.whiten);
        assert_eq!(config.determinism.seed, 2024);
        assert!(config.determinism.deterministic);
        assert_eq!(config.checkpoint_every, 10);
        assert_eq!(config.primary_metric, "VUS-PR");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_derived_paths() {
        let mut config = PipelineConfig::default();
        config.paths.save_dir = PathBuf::from("/tmp/run");
        assert_eq!(config.score_dir(), PathBuf::from("/tmp/run/scores"));
        assert_eq!(
            config.results_csv(),
            PathBuf::from("/tmp/run/metrics/PCA_all_results.csv")
        );
        assert_eq!(
            config.failures_csv(),
            PathBuf::from("/tmp/run/metrics/PCA_failed_files.csv")
        );
        assert_eq!(config.log_file(), PathBuf::from("/tmp/run/PCA_pipeline.log"));
    }

    #[test]
    fn test_config_partial_yaml_uses_defaults() {
        let yaml = r#"
checkpoint_every: 5
determinism:
  seed: 7
"#;
        let config: PipelineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.checkpoint_every, 5);
        assert_eq!(config.determinism.seed, 7);
        assert!(config.determinism.deterministic);
        assert_eq!(config.method.name, "PCA");
        assert_eq!(config.logging.format, "text");
    }

    #[test]
    fn test_config_validation_rejects_zero_checkpoint() {
        let config = PipelineConfig {
            checkpoint_every: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(config.validate(), Err(TsadError::Config(_))));
    }

    #[test]
    fn test_config_validation_rejects_unknown_log_format() {
        let mut config = PipelineConfig::default();
        config.logging.format = "xml".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("xml"));
    }

    #[test]
    fn test_notebook_command_line() {
        let notebook = NotebookConfig::default();
        assert_eq!(
            notebook.command_line(),
            "jupyter notebook PCA_Statistical_Analysis.ipynb"
        );
    }

    #[test]
    fn test_input_missing_display() {
        let err = TsadError::InputMissing {
            what: "Results table".to_string(),
            path: PathBuf::from("/x/y.csv"),
        };
        assert_eq!(err.to_string(), "Results table not found at /x/y.csv");
    }
}
