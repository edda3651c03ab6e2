//! tsadbench benchmark suite
//!
//! Batch evaluation of a time-series anomaly detector over a dataset
//! directory, and comparison of the results against a multi-method
//! benchmark table.
//!
//! # Modules
//!
//! - [`datasets`]: dataset and CSV table loaders
//! - [`metrics`]: descriptive statistics, Pearson correlation, Wilcoxon test
//! - [`runners`]: batch runner with durable result journal
//! - [`comparison`]: ranking, significance testing, plots, combined table
//! - [`config`]: YAML configuration loading
//! - [`telemetry`]: logging setup
//! - [`wrapper`]: quick-start prompts and step execution

pub mod comparison;
pub mod config;
pub mod datasets;
pub mod metrics;
pub mod runners;
pub mod telemetry;
pub mod wrapper;

/// Re-export commonly used types.
pub mod prelude {
    pub use crate::comparison::{Comparison, Ranking, SignificanceResult};
    pub use crate::datasets::{Dataset, DatasetLoader, Table};
    pub use crate::metrics::{Significance, Summary, WilcoxonResult};
    pub use crate::runners::{BatchRunner, Collaborators, ResultRecord, RunOutcome};
    pub use tsadbench_core::{PipelineConfig, Result, TsadError};
}
