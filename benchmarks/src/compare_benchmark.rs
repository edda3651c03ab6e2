//! Benchmark comparison binary.
//!
//! Loads the batch runner's results table and the multi-method benchmark
//! table, ranks every method by mean score, tests this system against the
//! strongest competitors, renders comparison charts and writes the combined
//! table. Without a benchmark table only the standalone statistics are
//! printed.
//!
//! Usage:
//!   cargo run --bin compare-benchmark
//!   cargo run --bin compare-benchmark -- --benchmark uni_mergedTable_VUS-PR.csv

use clap::Parser;
use std::path::PathBuf;
use tsadbench_benchmarks::comparison;
use tsadbench_benchmarks::config::resolve_config;
use tsadbench_benchmarks::telemetry;
use tsadbench_core::TsadError;

#[derive(Parser)]
#[command(name = "compare-benchmark", about = "Compare batch results with a benchmark table")]
struct Cli {
    /// YAML configuration file. Defaults apply when omitted.
    #[arg(long, env = "TSADBENCH_CONFIG")]
    config: Option<PathBuf>,

    /// Benchmark table (overrides the config).
    #[arg(long)]
    benchmark: Option<PathBuf>,

    /// Output directory for charts and the combined table (overrides the config).
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

fn main() {
    telemetry::init_stderr_logging();
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = resolve_config(cli.config.as_deref())?;
    if let Some(path) = cli.benchmark {
        config.paths.benchmark_path = path;
    }
    if let Some(dir) = cli.output_dir {
        config.paths.comparison_dir = dir;
    }

    match comparison::run(&config) {
        Ok(report) => {
            tracing::info!(
                results = report.results_rows,
                outcome = ?report.benchmark,
                written = report.written.len(),
                "Comparison finished"
            );
            Ok(())
        }
        Err(TsadError::InputMissing { what, path }) => {
            println!("Error: {what} not found at {}", path.display());
            println!("Please run run-pipeline first!");
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}
