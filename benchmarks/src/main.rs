//! Batch runner binary.
//!
//! Runs the configured detector over every dataset in the dataset directory,
//! saving one score artifact per dataset and the run's result, failure and
//! summary tables. Datasets with an existing score artifact are skipped, so
//! an interrupted run resumes where it stopped.
//!
//! Usage:
//!   cargo run --bin run-pipeline
//!   cargo run --bin run-pipeline -- --config tsadbench.yaml
//!   cargo run --bin run-pipeline -- --dataset-dir ../Datasets/TSB-AD-U/

use clap::Parser;
use std::path::PathBuf;
use tsadbench_benchmarks::config::resolve_config;
use tsadbench_benchmarks::runners::{BatchRunner, Collaborators};
use tsadbench_benchmarks::telemetry;
use tsadbench_bridge::CommandBridge;

#[derive(Parser)]
#[command(name = "run-pipeline", about = "Batch anomaly-detection runner")]
struct Cli {
    /// YAML configuration file. Defaults apply when omitted.
    #[arg(long, env = "TSADBENCH_CONFIG")]
    config: Option<PathBuf>,

    /// Directory of labelled dataset CSV files (overrides the config).
    #[arg(long)]
    dataset_dir: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = resolve_config(cli.config.as_deref())?;
    if let Some(dir) = cli.dataset_dir {
        config.paths.dataset_dir = dir;
    }
    telemetry::init_file_logging(&config.logging, &config.log_file())?;

    println!("{}", "=".repeat(80));
    println!("{} PIPELINE", config.method.name.to_uppercase());
    println!("{}", "=".repeat(80));
    println!("Log file: {}", config.log_file().display());
    println!(
        "Seed: {} (deterministic: {})",
        config.determinism.seed, config.determinism.deterministic
    );

    let bridge = CommandBridge::from_config(&config.bridge);
    let collaborators = Collaborators {
        detector: Box::new(bridge.clone()),
        window: Box::new(bridge.clone()),
        evaluator: Box::new(bridge),
    };

    let notebook = config.notebook.command_line();
    let metrics_dir = config.metrics_dir();
    let mut runner = BatchRunner::new(config, collaborators);
    let outcome = runner.run()?;

    println!("\n{}", "=".repeat(80));
    println!(
        "Processed {} | Failed {} | Skipped {} | Total {}",
        outcome.results.len(),
        outcome.failures.len(),
        outcome.skipped,
        outcome.total_files
    );
    println!("Next steps:");
    println!("  1. Review results in: {}", metrics_dir.display());
    println!("  2. Compare with the benchmark: cargo run --bin compare-benchmark");
    println!("  3. Run statistical analysis: {notebook}");
    println!("{}", "=".repeat(80));
    Ok(())
}
