//! Quick-start wrapper binary.
//!
//! Asks for confirmation, runs the batch runner, then offers to run the
//! benchmark comparison and to open the analysis notebook.
//!
//! Usage:
//!   cargo run --bin quick-start
//!   cargo run --bin quick-start -- --config tsadbench.yaml --yes

use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::Command;
use tsadbench_benchmarks::config::resolve_config;
use tsadbench_benchmarks::telemetry;
use tsadbench_benchmarks::wrapper::{self, StepStatus};

#[derive(Parser)]
#[command(name = "quick-start", about = "Run the full batch workflow interactively")]
struct Cli {
    /// YAML configuration file, forwarded to every step.
    #[arg(long, env = "TSADBENCH_CONFIG")]
    config: Option<PathBuf>,

    /// Working directory for relative paths. Defaults to the benchmarks
    /// crate directory.
    #[arg(long)]
    workdir: Option<PathBuf>,

    /// Answer yes to every prompt.
    #[arg(long)]
    yes: bool,
}

fn main() {
    telemetry::init_stderr_logging();
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    }
}

fn ask(prompt: &str, assume_yes: bool) -> bool {
    if assume_yes {
        println!("\n{prompt} (y/n): y");
        return true;
    }
    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    let mut output = std::io::stdout();
    wrapper::confirm(prompt, &mut input, &mut output)
}

fn step_command(binary: &str, config: Option<&Path>) -> std::io::Result<Command> {
    let mut command = wrapper::workspace_binary(binary)?;
    if let Some(path) = config {
        command.arg("--config").arg(path);
    }
    Ok(command)
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    // resolve before changing directory so a relative --config still works
    let config_path = cli
        .config
        .as_deref()
        .map(std::fs::canonicalize)
        .transpose()?;
    let workdir = cli.workdir.unwrap_or_else(wrapper::default_workdir);
    wrapper::pin_working_dir(&workdir)?;
    let config = resolve_config(config_path.as_deref())?;
    let method = config.method.name.clone();

    println!("\n{}", "=".repeat(80));
    println!("{} PIPELINE - QUICK START", method.to_uppercase());
    println!("{}", "=".repeat(80));
    println!("\nThis will:");
    println!(
        "  1. Run {method} on all datasets in {}",
        config.paths.dataset_dir.display()
    );
    println!("  2. Compare the results with the benchmark table (optional)");
    println!("  3. Open the statistical analysis notebook (optional)");
    println!("\nWorking directory: {}", workdir.display());
    println!("{}", "=".repeat(80));

    if !ask("Do you want to continue?", cli.yes) {
        println!("Aborted by user.");
        return Ok(0);
    }

    let status = wrapper::run_step(
        &mut step_command("run-pipeline", config_path.as_deref())?,
        &format!("Step 1/2: Running {method} on all datasets"),
    );
    match status {
        StepStatus::Succeeded => {}
        StepStatus::NotStarted(_) => {
            println!("\nCould not launch run-pipeline.");
            println!("Build all binaries first with `cargo build --bins`.");
            return Ok(1);
        }
        StepStatus::Failed(_) => {
            println!("\nPipeline failed. Check the logs for details.");
            if config.log_file().exists() {
                println!("  Log file: {}", config.log_file().display());
            }
            return Ok(1);
        }
    }

    println!("\n{}", "=".repeat(80));
    println!("Step 2/2: Statistical Analysis");
    println!("{}", "=".repeat(80));
    println!("\nPipeline execution complete!");
    println!("\nNext step: Open the analysis notebook");
    println!("  Command: {}", config.notebook.command_line());
    println!("\nOr view results directly:");
    println!("  Results CSV: {}", config.results_csv().display());
    println!("  Log file: {}", config.log_file().display());

    if ask("Would you like to run the benchmark comparison now?", cli.yes) {
        match step_command("compare-benchmark", config_path.as_deref()) {
            Ok(mut compare) => {
                wrapper::run_step(&mut compare, "Benchmark comparison");
            }
            Err(e) => println!("Could not locate compare-benchmark: {e}"),
        }
    }

    if ask("Would you like to open the analysis notebook now?", cli.yes) {
        wrapper::launch_viewer(
            &config.notebook.program,
            &config.notebook.args,
            &config.notebook.command_line(),
        );
    }

    println!("\n{}", "=".repeat(80));
    println!("{} PIPELINE COMPLETE!", method.to_uppercase());
    println!("{}", "=".repeat(80));
    println!("\nGenerated files:");
    println!(
        "  - {} - Anomaly scores for all datasets",
        config.score_dir().display()
    );
    println!("  - {} - Full results", config.results_csv().display());
    println!(
        "  - {} - Summary statistics",
        config.summary_csv().display()
    );
    println!("{}\n", "=".repeat(80));
    Ok(0)
}
