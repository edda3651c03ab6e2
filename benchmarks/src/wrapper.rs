//! Helpers for the interactive quick-start wrapper.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Ask a yes/no question. Only `y` (any case, surrounding whitespace
/// ignored) counts as yes; end of input counts as no.
pub fn confirm<R: BufRead, W: Write>(prompt: &str, input: &mut R, output: &mut W) -> bool {
    if write!(output, "\n{prompt} (y/n): ").and_then(|_| output.flush()).is_err() {
        return false;
    }
    let mut answer = String::new();
    match input.read_line(&mut answer) {
        Ok(0) | Err(_) => false,
        Ok(_) => answer.trim().eq_ignore_ascii_case("y"),
    }
}

/// How a wrapped step ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    Succeeded,
    /// Ran and exited unsuccessfully.
    Failed(String),
    /// The program could not be launched at all.
    NotStarted(String),
}

impl StepStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, StepStatus::Succeeded)
    }
}

/// Print a banner, run `command` to completion with inherited stdio, and
/// report the outcome. There is no timeout.
pub fn run_step(command: &mut Command, description: &str) -> StepStatus {
    println!("\n{}", "=".repeat(80));
    println!("{description}");
    println!("{}", "=".repeat(80));
    tracing::info!(step = description, command = ?command, "Running step");

    let status = match command.status() {
        Ok(status) if status.success() => StepStatus::Succeeded,
        Ok(status) => StepStatus::Failed(format!("exited with {status}")),
        Err(e) => StepStatus::NotStarted(format!("could not start: {e}")),
    };
    match &status {
        StepStatus::Succeeded => println!("{description} completed successfully!"),
        StepStatus::Failed(reason) | StepStatus::NotStarted(reason) => {
            println!("Error during {description}");
            println!("Error: {reason}");
            tracing::error!(step = description, error = %reason, "Step failed");
        }
    }
    status
}

/// Command running the workspace binary `name`: the build next to the
/// running executable when there is one, otherwise `cargo run` on the
/// package at `manifest_dir`. Extra arguments go after the returned
/// command's existing ones.
pub fn binary_command(name: &str, exe_dir: &Path, manifest_dir: &Path) -> Command {
    let sibling = exe_dir.join(format!("{name}{}", std::env::consts::EXE_SUFFIX));
    if sibling.is_file() {
        return Command::new(sibling);
    }
    tracing::debug!(binary = name, "No sibling build, falling back to cargo run");
    let mut command = Command::new("cargo");
    command
        .arg("run")
        .arg("--quiet")
        .arg("--manifest-path")
        .arg(manifest_dir.join("Cargo.toml"))
        .arg("--bin")
        .arg(name)
        .arg("--");
    command
}

/// [`binary_command`] for the running executable's directory and this
/// package.
pub fn workspace_binary(name: &str) -> std::io::Result<Command> {
    let exe = std::env::current_exe()?;
    let exe_dir = exe.parent().unwrap_or_else(|| Path::new("."));
    Ok(binary_command(name, exe_dir, &default_workdir()))
}

/// Make `dir` the working directory so relative config paths resolve
/// against it.
pub fn pin_working_dir(dir: &Path) -> std::io::Result<()> {
    std::env::set_current_dir(dir)?;
    tracing::debug!(dir = %dir.display(), "Working directory pinned");
    Ok(())
}

/// Default working directory: the benchmarks crate directory.
pub fn default_workdir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

/// Launch a best-effort viewer command and wait for it. Failures are
/// reported with the command to run by hand.
pub fn launch_viewer(program: &str, args: &[String], command_line: &str) -> StepStatus {
    println!("\nLaunching: {command_line}");
    match Command::new(program).args(args).status() {
        Ok(status) if status.success() => StepStatus::Succeeded,
        Ok(status) => {
            println!("Viewer exited with {status}");
            println!("Please run manually: {command_line}");
            StepStatus::Failed(format!("exited with {status}"))
        }
        Err(e) => {
            println!("Could not launch viewer: {e}");
            println!("Please run manually: {command_line}");
            StepStatus::NotStarted(e.to_string())
        }
    }
}
