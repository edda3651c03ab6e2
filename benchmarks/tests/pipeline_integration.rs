//! End-to-end runs of the batch runner and comparator with in-process
//! collaborators.

use ndarray::{ArrayView1, ArrayView2};
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use tempfile::TempDir;
use tsadbench_benchmarks::comparison::{self, BenchmarkOutcome, Comparison};
use tsadbench_benchmarks::datasets::Table;
use tsadbench_benchmarks::runners::{BatchRunner, Collaborators, ResultJournal};
use tsadbench_core::{
    AnomalyDetector, Determinism, DetectorOutput, DetectorParams, MetricSet, MetricsEvaluator,
    PipelineConfig, Result, TsadError, WindowEstimator, METRIC_AFFILIATION_PRECISION,
    METRIC_AFFILIATION_RECALL, METRIC_VUS_PR, METRIC_VUS_ROC,
};

type EventLog = Rc<RefCell<Vec<String>>>;

/// Scores each row with its first feature. Two-feature datasets get one
/// score too few.
struct EchoDetector {
    events: EventLog,
}

impl AnomalyDetector for EchoDetector {
    fn name(&self) -> &str {
        "echo"
    }

    fn initialize(&mut self, determinism: &Determinism) -> Result<()> {
        self.events
            .borrow_mut()
            .push(format!("init:{}", determinism.seed));
        Ok(())
    }

    fn detect(
        &self,
        method: &str,
        data: ArrayView2<'_, f64>,
        params: &DetectorParams,
    ) -> Result<DetectorOutput> {
        assert_eq!(method, "PCA");
        assert_eq!(params.n_components, None);
        assert!(!params.whiten);
        self.events.borrow_mut().push("detect".to_string());
        let mut scores = data.column(0).to_vec();
        if data.ncols() == 2 {
            scores.pop();
        }
        Ok(DetectorOutput::Scores(scores))
    }
}

struct LengthWindow;

impl WindowEstimator for LengthWindow {
    fn find_length_rank(&self, series: ArrayView1<'_, f64>, rank: usize) -> Result<usize> {
        assert_eq!(rank, 1);
        Ok(series.len())
    }
}

/// VUS-PR is a tenth of the mean score.
struct MeanEvaluator;

impl MetricsEvaluator for MeanEvaluator {
    fn evaluate(
        &self,
        scores: ArrayView1<'_, f64>,
        _labels: ArrayView1<'_, i64>,
        _sliding_window: usize,
    ) -> Result<MetricSet> {
        let mean = scores.sum() / scores.len() as f64;
        let mut set = MetricSet::new();
        set.insert(METRIC_VUS_PR, mean / 10.0);
        set.insert(METRIC_VUS_ROC, 0.8);
        set.insert(METRIC_AFFILIATION_PRECISION, 0.6);
        set.insert(METRIC_AFFILIATION_RECALL, 0.7);
        Ok(set)
    }
}

fn write_datasets(dir: &Path) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join("a.csv"), "Data,Label\n1,0\n2,0\n3,1\n4,0\n").unwrap();
    std::fs::write(dir.join("b.csv"), "Data,Label\n2,0\n4,1\n6,1\n8,0\n").unwrap();
    std::fs::write(dir.join("c.csv"), "Data,Label\n1,0\noops,1\n").unwrap();
}

fn config(root: &TempDir) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.paths.dataset_dir = root.path().join("data");
    config.paths.save_dir = root.path().join("out");
    config.checkpoint_every = 1;
    config
}

fn runner(config: PipelineConfig, events: EventLog) -> BatchRunner {
    BatchRunner::new(
        config,
        Collaborators {
            detector: Box::new(EchoDetector { events }),
            window: Box::new(LengthWindow),
            evaluator: Box::new(MeanEvaluator),
        },
    )
}

#[test]
fn test_run_records_results_and_failures() {
    let root = TempDir::new().unwrap();
    write_datasets(&root.path().join("data"));
    let config = config(&root);

    let outcome = runner(config.clone(), EventLog::default()).run().unwrap();

    assert_eq!(outcome.total_files, 3);
    assert_eq!(outcome.results.len(), 2);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].file, "c.csv");
    assert!(outcome.failures[0].error.contains("oops"));

    let a = &outcome.results[0];
    assert_eq!(a.file, "a.csv");
    assert_eq!(a.data_length, 4);
    assert_eq!(a.num_features, 1);
    assert_eq!(a.num_anomalies, 1);
    assert_eq!(a.sliding_window, 4);
    assert!((a.metric(METRIC_VUS_PR) - 0.25).abs() < 1e-12);

    assert!(config.score_dir().join("a.npy").exists());
    assert!(config.score_dir().join("b.npy").exists());
    assert!(!config.score_dir().join("c.npy").exists());

    let results = Table::from_path(&config.results_csv(), "results").unwrap();
    assert_eq!(results.file_column("results").unwrap(), vec!["a.csv", "b.csv"]);
    let failures = Table::from_path(&config.failures_csv(), "failures").unwrap();
    assert_eq!(failures.file_column("failures").unwrap(), vec!["c.csv"]);
    assert!(config.summary_csv().exists());
    assert!(config.log_file().parent().unwrap().exists());
}

#[test]
fn test_result_and_failure_files_are_disjoint() {
    let root = TempDir::new().unwrap();
    write_datasets(&root.path().join("data"));
    let outcome = runner(config(&root), EventLog::default()).run().unwrap();

    for failure in &outcome.failures {
        assert!(outcome.results.iter().all(|r| r.file != failure.file));
    }
}

#[test]
fn test_rerun_skips_processed_files() {
    let root = TempDir::new().unwrap();
    write_datasets(&root.path().join("data"));
    let config = config(&root);

    runner(config.clone(), EventLog::default()).run().unwrap();
    let events = EventLog::default();
    let second = runner(config.clone(), events.clone()).run().unwrap();

    assert!(second.results.is_empty());
    assert_eq!(second.skipped, 2);
    // the broken file has no artifact, so it is attempted again
    assert_eq!(second.failures.len(), 1);
    assert_eq!(second.attempted() + second.skipped, second.total_files);
    assert!(!events.borrow().iter().any(|e| e == "detect"));

    // earlier results survive through the journal
    let results = Table::from_path(&config.results_csv(), "results").unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(ResultJournal::read_all(&config.journal_path()).unwrap().len(), 2);
}

#[test]
fn test_contract_violation_is_a_file_failure() {
    let root = TempDir::new().unwrap();
    let data = root.path().join("data");
    std::fs::create_dir_all(&data).unwrap();
    std::fs::write(data.join("wide.csv"), "x,y,Label\n1,2,0\n3,4,1\n").unwrap();
    let config = config(&root);

    let outcome = runner(config.clone(), EventLog::default()).run().unwrap();

    assert!(outcome.results.is_empty());
    assert_eq!(outcome.failures.len(), 1);
    assert!(outcome.failures[0]
        .error
        .contains("Detector contract violation"));
    assert!(!config.score_dir().join("wide.npy").exists());
    assert!(!config.results_csv().exists());
}

#[test]
fn test_seed_reaches_detector_before_detection() {
    let root = TempDir::new().unwrap();
    write_datasets(&root.path().join("data"));
    let mut config = config(&root);
    config.determinism.seed = 99;

    let events = EventLog::default();
    runner(config, events.clone()).run().unwrap();

    let events = events.borrow();
    assert_eq!(events[0], "init:99");
    assert_eq!(events.iter().filter(|e| e.starts_with("init")).count(), 1);
    assert_eq!(events.iter().filter(|e| *e == "detect").count(), 2);
}

#[test]
fn test_comparison_on_run_output() {
    let root = TempDir::new().unwrap();
    write_datasets(&root.path().join("data"));
    let config = config(&root);
    runner(config.clone(), EventLog::default()).run().unwrap();

    let results = Table::from_path(&config.results_csv(), "results").unwrap();
    let benchmark = Table::new(
        vec!["file".to_string(), "LOF".to_string(), "IForest".to_string()],
        vec![
            vec!["b.csv".to_string(), "0.1".to_string(), "0.9".to_string()],
            vec!["x.csv".to_string(), "0.2".to_string(), "0.8".to_string()],
            vec!["a.csv".to_string(), "0.3".to_string(), "0.7".to_string()],
        ],
    );

    let comparison = Comparison::build(&results, &benchmark, "PCA", METRIC_VUS_PR).unwrap();
    assert_eq!(comparison.common_files(), 2);
    let pca = comparison.scores("PCA");
    assert!((pca[0] - 0.5).abs() < 1e-12);
    assert!((pca[1] - 0.25).abs() < 1e-12);

    let ranking = comparison.ranking();
    assert_eq!(ranking.entries()[0].method, "IForest");
    assert_eq!(ranking.our_rank(), Some(2));
    assert_eq!(ranking.outperforms(), 1);

    let out = root.path().join("combined_results.csv");
    comparison.write_combined(&out).unwrap();
    let combined = Table::from_path(&out, "combined").unwrap();
    assert_eq!(combined.len(), 2);
    assert_eq!(combined.headers().last().unwrap(), "PCA");
}

#[test]
fn test_ranking_is_stable_for_equal_means() {
    let results = Table::new(
        vec!["file".to_string(), "VUS-PR".to_string()],
        vec![vec!["a.csv".to_string(), "0.1".to_string()]],
    );
    let benchmark = Table::new(
        vec!["file".to_string(), "A".to_string(), "B".to_string(), "C".to_string()],
        vec![vec![
            "a.csv".to_string(),
            "0.5".to_string(),
            "0.5".to_string(),
            "0.6".to_string(),
        ]],
    );
    let ranking = Comparison::build(&results, &benchmark, "PCA", "VUS-PR")
        .unwrap()
        .ranking();
    let order: Vec<&str> = ranking.entries().iter().map(|e| e.method.as_str()).collect();
    assert_eq!(order, vec!["C", "A", "B", "PCA"]);
}

fn string_table(headers: &[&str], rows: &[&[&str]]) -> Table {
    Table::new(
        headers.iter().map(|s| s.to_string()).collect(),
        rows.iter()
            .map(|r| r.iter().map(|s| s.to_string()).collect())
            .collect(),
    )
}

/// Results table with VUS-PR 0.1, 0.2, 0.3, 0.4 written where the runner
/// would put it.
fn write_results(config: &PipelineConfig) {
    std::fs::create_dir_all(config.metrics_dir()).unwrap();
    string_table(
        &["file", "VUS-PR"],
        &[
            &["a.csv", "0.1"],
            &["b.csv", "0.2"],
            &["c.csv", "0.3"],
            &["d.csv", "0.4"],
        ],
    )
    .write(&config.results_csv())
    .unwrap();
}

fn comparison_config(root: &TempDir) -> PipelineConfig {
    let mut config = config(root);
    config.paths.benchmark_path = root.path().join("benchmark.csv");
    config.paths.comparison_dir = root.path().join("comparisons");
    config
}

fn assert_standalone(report: &comparison::Report) {
    assert_eq!(report.results_rows, 4);
    assert_eq!(report.summary.count, 4);
    assert!((report.summary.mean - 0.25).abs() < 1e-12);
    assert!((report.summary.median - 0.25).abs() < 1e-12);
    assert!((report.summary.max - 0.4).abs() < 1e-12);
    assert!((report.summary.min - 0.1).abs() < 1e-12);
}

#[test]
fn test_comparison_empty_intersection_keeps_standalone_statistics() {
    let root = TempDir::new().unwrap();
    let config = comparison_config(&root);
    write_results(&config);
    string_table(&["file", "LOF"], &[&["z.csv", "0.4"]])
        .write(&config.paths.benchmark_path)
        .unwrap();

    let report = comparison::run(&config).unwrap();

    assert_eq!(report.benchmark, BenchmarkOutcome::NoCommonFiles);
    assert!(report.written.is_empty());
    assert!(!comparison::combined_path(&config.paths.comparison_dir).exists());
    assert_standalone(&report);
}

#[test]
fn test_comparison_without_benchmark_reports_standalone_only() {
    let root = TempDir::new().unwrap();
    let config = comparison_config(&root);
    write_results(&config);

    let report = comparison::run(&config).unwrap();

    assert_eq!(report.benchmark, BenchmarkOutcome::Missing);
    assert!(report.written.is_empty());
    assert!(!config.paths.comparison_dir.exists());
    assert_standalone(&report);
}

#[test]
fn test_comparison_without_results_is_input_missing() {
    let root = TempDir::new().unwrap();
    let config = comparison_config(&root);

    let err = comparison::run(&config).unwrap_err();
    assert!(matches!(err, TsadError::InputMissing { .. }));
    assert!(!config.paths.comparison_dir.exists());
}

#[test]
fn test_comparison_writes_combined_table() {
    let root = TempDir::new().unwrap();
    let config = comparison_config(&root);
    write_results(&config);
    string_table(
        &["file", "LOF"],
        &[&["b.csv", "0.5"], &["q.csv", "0.1"], &["d.csv", "0.6"]],
    )
    .write(&config.paths.benchmark_path)
    .unwrap();

    let report = comparison::run(&config).unwrap();

    assert_eq!(
        report.benchmark,
        BenchmarkOutcome::Compared {
            common_files: 2,
            our_rank: Some(2),
        }
    );
    let combined_path = comparison::combined_path(&config.paths.comparison_dir);
    assert_eq!(report.written.last(), Some(&combined_path));
    let combined = Table::from_path(&combined_path, "combined").unwrap();
    assert_eq!(combined.file_column("combined").unwrap(), vec!["b.csv", "d.csv"]);
    assert_standalone(&report);
}

#[test]
fn test_unjournaled_artifact_is_reprocessed() {
    let root = TempDir::new().unwrap();
    write_datasets(&root.path().join("data"));
    let config = config(&root);
    // scores saved by a run that stopped before its journal checkpoint
    std::fs::create_dir_all(config.score_dir()).unwrap();
    std::fs::write(config.score_dir().join("a.csv").with_extension("npy"), b"stale").unwrap();

    let events = EventLog::default();
    let outcome = runner(config.clone(), events.clone()).run().unwrap();

    assert_eq!(outcome.skipped, 0);
    assert_eq!(outcome.results.len(), 2);
    assert_eq!(outcome.results[0].file, "a.csv");
    assert_eq!(events.borrow().iter().filter(|e| *e == "detect").count(), 2);
    let results = Table::from_path(&config.results_csv(), "results").unwrap();
    assert_eq!(results.file_column("results").unwrap(), vec!["a.csv", "b.csv"]);
}
