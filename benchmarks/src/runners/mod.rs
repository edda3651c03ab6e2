//! Batch runner for tsadbench.
//!
//! Runs the configured detector over every dataset file in a directory:
//! 1. Skips files that are journaled and whose score artifact exists
//! 2. Loads and cleans the dataset, estimates the sliding window
//! 3. Runs the detector (timed), validates and saves the scores
//! 4. Evaluates the scores and journals the merged record
//!
//! A failure in any step is recorded against the file and the loop moves on.
//! At the end the journal is compacted into the results table:
//!
//! ```text
//! file,time,data_length,num_features,num_anomalies,anomaly_ratio,sliding_window,VUS-PR,VUS-ROC,...
//! 001_NAB_id_1_Facility_tr_1007_1st_2014.csv,0.0123,4032,1,12,0.0029,48,0.4210,0.8014,...
//! ```

pub mod artifacts;
pub mod journal;
pub mod types;

pub use journal::ResultJournal;
pub use types::{FailureRecord, ResultRecord, RunOutcome};

use crate::datasets::DatasetLoader;
use crate::metrics;
use std::collections::HashSet;
use std::path::Path;
use std::time::Instant;
use tsadbench_core::{
    AnomalyDetector, MetricsEvaluator, PipelineConfig, Result, WindowEstimator,
    METRIC_AFFILIATION_PRECISION, METRIC_AFFILIATION_RECALL, METRIC_VUS_PR, METRIC_VUS_ROC,
    REQUIRED_METRICS,
};

/// The three external collaborators a run depends on.
pub struct Collaborators {
    pub detector: Box<dyn AnomalyDetector>,
    pub window: Box<dyn WindowEstimator>,
    pub evaluator: Box<dyn MetricsEvaluator>,
}

/// Drives one batch run over a dataset directory.
pub struct BatchRunner {
    config: PipelineConfig,
    collaborators: Collaborators,
    initialized: bool,
}

impl BatchRunner {
    pub fn new(config: PipelineConfig, collaborators: Collaborators) -> Self {
        Self {
            config,
            collaborators,
            initialized: false,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Hand the configured seed to the detector.
    ///
    /// Runs at most once per runner; [`run`](Self::run) calls it if the
    /// caller has not.
    pub fn initialize(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        let determinism = self.config.determinism;
        self.collaborators.detector.initialize(&determinism)?;
        self.initialized = true;
        tracing::info!(
            detector = self.collaborators.detector.name(),
            seed = determinism.seed,
            deterministic = determinism.deterministic,
            "Detector initialized"
        );
        Ok(())
    }

    /// Process every dataset file and write the run's tables.
    ///
    /// # Errors
    ///
    /// Fails only on run-level problems: a missing dataset directory, an
    /// output directory or journal that cannot be created, or a table that
    /// cannot be written. Per-file problems become [`FailureRecord`]s.
    pub fn run(&mut self) -> Result<RunOutcome> {
        self.initialize()?;

        let started_at = chrono::Utc::now();
        let start = Instant::now();
        let dataset_dir = self.config.paths.dataset_dir.clone();
        let files = DatasetLoader::list_csv_files(&dataset_dir)?;

        let score_dir = self.config.score_dir();
        let metrics_dir = self.config.metrics_dir();
        std::fs::create_dir_all(&score_dir)?;
        std::fs::create_dir_all(&metrics_dir)?;

        println!(
            "\nFound {} datasets in {}",
            files.len(),
            dataset_dir.display()
        );
        println!("Scores will be saved to: {}", score_dir.display());
        println!("Metrics will be saved to: {}", metrics_dir.display());
        println!("{}", "=".repeat(80));
        tracing::info!(
            datasets = files.len(),
            dataset_dir = %dataset_dir.display(),
            method = %self.config.method.name,
            "Batch run started"
        );

        let journaled: HashSet<String> = ResultJournal::read_all(&self.config.journal_path())?
            .into_iter()
            .map(|r| r.file)
            .collect();
        let mut journal = ResultJournal::open(&self.config.journal_path())?;
        let mut results: Vec<ResultRecord> = Vec::new();
        let mut failures: Vec<FailureRecord> = Vec::new();
        let mut skipped = 0usize;
        let total = files.len();

        for (idx, path) in files.iter().enumerate() {
            let position = idx + 1;
            let file = file_name(path);
            let artifact = artifacts::score_artifact_path(&score_dir, &file);

            if artifact.exists() {
                if journaled.contains(&file) {
                    println!("[{position}/{total}] Skipping {file} (already processed)");
                    tracing::debug!(file = %file, "Already journaled, skipping");
                    skipped += 1;
                    continue;
                }
                // scores saved but the record never reached the journal
                tracing::warn!(file = %file, "Score artifact without journal record, reprocessing");
            }

            println!("\n[{position}/{total}] Processing: {file}");
            tracing::info!(file = %file, "Processing dataset");

            let attempt = self
                .process_file(path, &file, &artifact)
                .and_then(|record| {
                    journal.append(&record)?;
                    Ok(record)
                });

            match attempt {
                Ok(record) => {
                    print_record(&record);
                    tracing::info!(
                        file = %file,
                        time = record.time,
                        vus_pr = record.metric(METRIC_VUS_PR),
                        "Dataset processed"
                    );
                    results.push(record);
                    if results.len() % self.config.checkpoint_every == 0 {
                        journal.sync()?;
                        println!("  -> Checkpoint: saved {} results", results.len());
                        tracing::info!(records = results.len(), "Journal checkpoint");
                    }
                }
                Err(e) => {
                    println!("  FAILED: {file} - {e}");
                    tracing::error!(file = %file, error = %e, "Dataset failed");
                    if artifact.exists() {
                        if let Err(remove_err) = std::fs::remove_file(&artifact) {
                            tracing::warn!(
                                artifact = %artifact.display(),
                                error = %remove_err,
                                "Could not remove score artifact of failed dataset"
                            );
                        }
                    }
                    failures.push(FailureRecord {
                        file,
                        error: e.to_string(),
                    });
                }
            }
        }

        journal.finish()?;

        let failed: HashSet<&str> = failures.iter().map(|f| f.file.as_str()).collect();
        let final_records: Vec<ResultRecord> = ResultJournal::compact(&self.config.journal_path())?
            .into_iter()
            .filter(|r| !failed.contains(r.file.as_str()))
            .collect();

        println!("\n{}", "=".repeat(80));
        println!("Pipeline Complete!");
        println!("{}", "=".repeat(80));

        if !final_records.is_empty() {
            let table = types::results_table(&final_records);
            table.write(&self.config.results_csv())?;
            types::summary_table(&table).write(&self.config.summary_csv())?;
            println!(
                "Results table holds {} datasets ({} new this run)",
                final_records.len(),
                results.len()
            );
            println!("  Results saved to: {}", self.config.results_csv().display());
            println!("  Summary saved to: {}", self.config.summary_csv().display());
            print_summary_statistics(&final_records);
        }

        if !failures.is_empty() {
            types::write_failures_csv(&failures, &self.config.failures_csv())?;
            println!("\nFailed to process {} datasets", failures.len());
            println!(
                "  Error log saved to: {}",
                self.config.failures_csv().display()
            );
        }

        let elapsed = start.elapsed();
        let secs = elapsed.as_secs_f64();
        println!("  Total Runtime: {:.2}s ({:.2} minutes)", secs, secs / 60.0);
        tracing::info!(
            processed = results.len(),
            failed = failures.len(),
            skipped,
            elapsed_secs = secs,
            "Batch run finished"
        );

        Ok(RunOutcome {
            results,
            failures,
            skipped,
            total_files: total,
            started_at,
            elapsed,
        })
    }

    fn process_file(&self, path: &Path, file: &str, artifact: &Path) -> Result<ResultRecord> {
        let dataset = DatasetLoader::load_csv(path)?;
        if dataset.dropped_rows > 0 {
            tracing::debug!(file, dropped = dataset.dropped_rows, "Dropped rows with missing values");
        }
        println!(
            "  Data shape: ({}, {}), Labels: {} anomalies ({:.2}%)",
            dataset.len(),
            dataset.num_features(),
            dataset.num_anomalies(),
            100.0 * dataset.anomaly_ratio()
        );

        let sliding_window = self
            .collaborators
            .window
            .find_length_rank(dataset.first_feature(), self.config.method.window_rank)?;

        let params = self.config.method.detector_params();
        let detect_start = Instant::now();
        let output = self.collaborators.detector.detect(
            &self.config.method.name,
            dataset.features.view(),
            &params,
        )?;
        let time = detect_start.elapsed().as_secs_f64();

        let scores = output.into_scores(dataset.len())?;
        artifacts::write_scores(artifact, &scores)?;
        println!("  Anomaly scores saved");

        let metrics = self.collaborators.evaluator.evaluate(
            scores.view(),
            dataset.labels.view(),
            sliding_window,
        )?;
        metrics.require(&REQUIRED_METRICS)?;

        Ok(ResultRecord {
            file: file.to_string(),
            time,
            data_length: dataset.len(),
            num_features: dataset.num_features(),
            num_anomalies: dataset.num_anomalies(),
            anomaly_ratio: dataset.anomaly_ratio(),
            sliding_window,
            metrics,
        })
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn print_record(record: &ResultRecord) {
    println!("  Runtime: {:.3}s", record.time);
    println!("  VUS-PR: {:.4}", record.metric(METRIC_VUS_PR));
    println!("  VUS-ROC: {:.4}", record.metric(METRIC_VUS_ROC));
    println!(
        "  Affiliation Precision: {:.4}",
        record.metric(METRIC_AFFILIATION_PRECISION)
    );
    println!(
        "  Affiliation Recall: {:.4}",
        record.metric(METRIC_AFFILIATION_RECALL)
    );
}

/// Print mean and sample std of the headline metrics and runtime.
pub fn print_summary_statistics(records: &[ResultRecord]) {
    let column = |name: &str| -> Vec<f64> { records.iter().map(|r| r.metric(name)).collect() };
    let vus_pr = column(METRIC_VUS_PR);
    let vus_roc = column(METRIC_VUS_ROC);
    let times: Vec<f64> = records.iter().map(|r| r.time).collect();

    println!("\nSummary Statistics:");
    println!(
        "  Mean VUS-PR: {:.4} +/- {:.4}",
        metrics::mean(&vus_pr),
        metrics::sample_std(&vus_pr)
    );
    println!(
        "  Mean VUS-ROC: {:.4} +/- {:.4}",
        metrics::mean(&vus_roc),
        metrics::sample_std(&vus_roc)
    );
    println!(
        "  Mean Runtime: {:.3}s +/- {:.3}s",
        metrics::mean(&times),
        metrics::sample_std(&times)
    );
}
