//! Child-process bridge to the external anomaly-detection library.
//!
//! [`CommandBridge`] implements all three collaborator traits from
//! `tsadbench-core` by launching the configured interpreter on a bridge
//! script once per call. The request is a single JSON object on stdin, the
//! response a single JSON object on stdout:
//!
//! | `op`      | Request fields                                   | Response           |
//! |-----------|--------------------------------------------------|--------------------|
//! | `detect`  | `method`, `data`, `params`, `seed`, `deterministic` | `{"scores": ...}` |
//! | `window`  | `series`, `rank`                                 | `{"window": n}`    |
//! | `metrics` | `scores`, `labels`, `sliding_window`             | `{"metrics": [[name, value], ...]}` |
//!
//! Any op may answer `{"error": "..."}` instead. The `scores` payload is not
//! trusted: anything other than a flat numeric array comes back as
//! [`DetectorOutput::Malformed`] so the runner can apply the detector
//! contract.

use ndarray::{ArrayView1, ArrayView2};
use serde::Serialize;
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Instant;
use tsadbench_core::{
    AnomalyDetector, BridgeConfig, Determinism, DetectorOutput, DetectorParams, MetricSet,
    MetricsEvaluator, Result, TsadError, WindowEstimator,
};

/// Maximum number of stderr bytes quoted in an error message.
const STDERR_EXCERPT_BYTES: usize = 2048;

/// Request envelope written to the bridge's stdin.
#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum BridgeRequest<'a> {
    Detect {
        method: &'a str,
        data: Vec<Vec<f64>>,
        params: &'a DetectorParams,
        seed: u64,
        deterministic: bool,
    },
    Window {
        series: Vec<f64>,
        rank: usize,
    },
    Metrics {
        scores: Vec<f64>,
        labels: Vec<i64>,
        sliding_window: usize,
    },
}

impl BridgeRequest<'_> {
    fn op(&self) -> &'static str {
        match self {
            BridgeRequest::Detect { .. } => "detect",
            BridgeRequest::Window { .. } => "window",
            BridgeRequest::Metrics { .. } => "metrics",
        }
    }
}

/// Collaborator backed by a child process per call.
#[derive(Debug, Clone)]
pub struct CommandBridge {
    program: String,
    args: Vec<String>,
    script: PathBuf,
    determinism: Determinism,
}

impl CommandBridge {
    /// Build a bridge from configuration, defaulting to the bundled script.
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            script: config.script.clone().unwrap_or_else(Self::bundled_script),
            determinism: Determinism::default(),
        }
    }

    /// Path of the bridge script shipped with this crate.
    pub fn bundled_script() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("python/tsb_ad_bridge.py")
    }

    /// The determinism settings that will accompany detect requests.
    pub fn determinism(&self) -> Determinism {
        self.determinism
    }

    fn call(&self, request: &BridgeRequest<'_>) -> Result<Value> {
        let op = request.op();
        let payload = serde_json::to_vec(request)?;
        let start = Instant::now();

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(&self.script)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                TsadError::Collaborator(format!("failed to launch `{}`: {e}", self.program))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            // A child that exits without reading its input is judged by its exit status.
            match stdin.write_all(&payload) {
                Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => {
                    return Err(TsadError::Collaborator(format!(
                        "failed to send `{op}` request: {e}"
                    )));
                }
                _ => {}
            }
        }

        let output = child.wait_with_output()?;
        tracing::debug!(
            op,
            elapsed_ms = start.elapsed().as_millis() as u64,
            status = ?output.status.code(),
            "bridge call finished"
        );

        if !output.status.success() {
            return Err(TsadError::Collaborator(format!(
                "`{op}` bridge exited with {}: {}",
                output.status,
                stderr_excerpt(&output.stderr)
            )));
        }

        parse_response(&output.stdout)
    }
}

/// Parse a bridge response body, surfacing `{"error": ...}` as an error.
fn parse_response(stdout: &[u8]) -> Result<Value> {
    let value: Value = serde_json::from_slice(stdout).map_err(|e| {
        TsadError::Collaborator(format!(
            "bridge returned invalid JSON ({e}): {}",
            stderr_excerpt(stdout)
        ))
    })?;
    if let Some(message) = value.get("error") {
        let message = message
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| message.to_string());
        return Err(TsadError::Collaborator(message));
    }
    Ok(value)
}

fn stderr_excerpt(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim();
    if text.len() <= STDERR_EXCERPT_BYTES {
        return text.to_string();
    }
    let mut cut = text.len() - STDERR_EXCERPT_BYTES;
    while !text.is_char_boundary(cut) {
        cut += 1;
    }
    format!("...{}", &text[cut..])
}

/// Classify the `scores` field of a detect response.
fn detector_output(response: Value) -> DetectorOutput {
    let scores = match response {
        Value::Object(mut map) => map.remove("scores").unwrap_or(Value::Null),
        other => other,
    };
    let numeric = scores.as_array().and_then(|items| {
        items
            .iter()
            .map(|item| match item {
                Value::Number(n) => n.as_f64(),
                Value::Null => Some(f64::NAN),
                _ => None,
            })
            .collect::<Option<Vec<f64>>>()
    });
    match numeric {
        Some(values) => DetectorOutput::Scores(values),
        None => DetectorOutput::Malformed(scores),
    }
}

fn window_from(response: &Value) -> Result<usize> {
    response
        .get("window")
        .and_then(Value::as_u64)
        .map(|w| w as usize)
        .ok_or_else(|| {
            TsadError::Collaborator(format!("window response without integer `window`: {response}"))
        })
}

fn metrics_from(response: Value) -> Result<MetricSet> {
    match response {
        Value::Object(mut map) => {
            let metrics = map.remove("metrics").ok_or_else(|| {
                TsadError::Collaborator("metrics response without `metrics`".to_string())
            })?;
            Ok(serde_json::from_value(metrics)?)
        }
        other => Err(TsadError::Collaborator(format!(
            "metrics response is not an object: {other}"
        ))),
    }
}

impl AnomalyDetector for CommandBridge {
    fn name(&self) -> &str {
        "tsb-ad-bridge"
    }

    fn initialize(&mut self, determinism: &Determinism) -> Result<()> {
        self.determinism = *determinism;
        tracing::info!(
            seed = determinism.seed,
            deterministic = determinism.deterministic,
            "bridge determinism configured"
        );
        Ok(())
    }

    fn detect(
        &self,
        method: &str,
        data: ArrayView2<'_, f64>,
        params: &DetectorParams,
    ) -> Result<DetectorOutput> {
        let rows = data.rows().into_iter().map(|row| row.to_vec()).collect();
        let response = self.call(&BridgeRequest::Detect {
            method,
            data: rows,
            params,
            seed: self.determinism.seed,
            deterministic: self.determinism.deterministic,
        })?;
        Ok(detector_output(response))
    }
}

impl WindowEstimator for CommandBridge {
    fn find_length_rank(&self, series: ArrayView1<'_, f64>, rank: usize) -> Result<usize> {
        let response = self.call(&BridgeRequest::Window {
            series: series.to_vec(),
            rank,
        })?;
        window_from(&response)
    }
}

impl MetricsEvaluator for CommandBridge {
    fn evaluate(
        &self,
        scores: ArrayView1<'_, f64>,
        labels: ArrayView1<'_, i64>,
        sliding_window: usize,
    ) -> Result<MetricSet> {
        let response = self.call(&BridgeRequest::Metrics {
            scores: scores.to_vec(),
            labels: labels.to_vec(),
            sliding_window,
        })?;
        metrics_from(response)
    }
}
