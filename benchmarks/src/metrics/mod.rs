//! Descriptive and inferential statistics for tsadbench.
//!
//! Everything here treats NaN as a missing observation and skips it, so a
//! column read from a CSV with blank cells summarises the same way a
//! dataframe would:
//!
//! - **Descriptive**: count, mean, sample standard deviation (n - 1), median,
//!   min, max
//! - **Correlation**: Pearson over pairwise-complete observations
//! - **Paired test**: two-sided Wilcoxon signed-rank, exact for small samples
//!   without ties, normal approximation with tie correction otherwise

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

/// Largest sample for which the signed-rank p-value is computed exactly.
const EXACT_SIGNED_RANK_MAX_N: usize = 50;

fn present(values: &[f64]) -> impl Iterator<Item = f64> + '_ {
    values.iter().copied().filter(|v| !v.is_nan())
}

/// Mean of the non-NaN values, NaN if there are none.
pub fn mean(values: &[f64]) -> f64 {
    let (sum, n) = present(values).fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        f64::NAN
    } else {
        sum / n as f64
    }
}

/// Sample standard deviation of the non-NaN values, NaN below two values.
pub fn sample_std(values: &[f64]) -> f64 {
    let n = present(values).count();
    if n < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    let ss: f64 = present(values).map(|v| (v - m) * (v - m)).sum();
    (ss / (n - 1) as f64).sqrt()
}

/// Median of the non-NaN values, NaN if there are none.
pub fn median(values: &[f64]) -> f64 {
    let mut sorted: Vec<f64> = present(values).collect();
    if sorted.is_empty() {
        return f64::NAN;
    }
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Minimum of the non-NaN values, NaN if there are none.
pub fn min(values: &[f64]) -> f64 {
    present(values).reduce(f64::min).unwrap_or(f64::NAN)
}

/// Maximum of the non-NaN values, NaN if there are none.
pub fn max(values: &[f64]) -> f64 {
    present(values).reduce(f64::max).unwrap_or(f64::NAN)
}

/// Descriptive statistics of one numeric column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
}

impl Summary {
    /// Summarise the non-NaN values of `values`.
    pub fn of(values: &[f64]) -> Self {
        Self {
            count: present(values).count(),
            mean: mean(values),
            std: sample_std(values),
            median: median(values),
            min: min(values),
            max: max(values),
        }
    }

    /// Column names of [`Summary::to_row`], in order.
    pub fn field_names() -> [&'static str; 6] {
        ["count", "mean", "std", "median", "min", "max"]
    }

    /// The statistics as CSV cells (NaN as an empty cell).
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.count.to_string(),
            format_cell(self.mean),
            format_cell(self.std),
            format_cell(self.median),
            format_cell(self.min),
            format_cell(self.max),
        ]
    }
}

/// Render a float for a CSV cell; NaN becomes empty.
pub fn format_cell(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        value.to_string()
    }
}

/// Pearson correlation over the positions where both values are present.
///
/// Returns `None` with fewer than two complete pairs or when either side has
/// zero variance.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = x
        .iter()
        .zip(y)
        .filter(|(a, b)| !a.is_nan() && !b.is_nan())
        .map(|(a, b)| (*a, *b))
        .collect();
    if pairs.len() < 2 {
        return None;
    }
    let n = pairs.len() as f64;
    let mx = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let my = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (a, b) in &pairs {
        sxy += (a - mx) * (b - my);
        sxx += (a - mx) * (a - mx);
        syy += (b - my) * (b - my);
    }
    if sxx == 0.0 || syy == 0.0 {
        return None;
    }
    Some(sxy / (sxx * syy).sqrt())
}

// ---------------------------------------------------------------------------
// Wilcoxon signed-rank test
// ---------------------------------------------------------------------------

/// How the signed-rank p-value was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PValueMethod {
    Exact,
    NormalApproximation,
}

/// Outcome of a two-sided Wilcoxon signed-rank test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WilcoxonResult {
    /// Smaller of the positive and negative rank sums.
    pub statistic: f64,
    pub p_value: f64,
    /// Number of non-zero differences the test used.
    pub n: usize,
    pub method: PValueMethod,
}

/// Two-sided Wilcoxon signed-rank test on paired samples.
///
/// Pairs with a NaN on either side are ignored, zero differences are
/// discarded, and tied absolute differences receive their average rank.
/// Returns `None` when no non-zero difference remains.
pub fn wilcoxon_signed_rank(x: &[f64], y: &[f64]) -> Option<WilcoxonResult> {
    let all: Vec<f64> = x
        .iter()
        .zip(y)
        .filter(|(a, b)| !a.is_nan() && !b.is_nan())
        .map(|(a, b)| a - b)
        .collect();
    let had_zeros = all.iter().any(|d| *d == 0.0);
    let diffs: Vec<f64> = all.into_iter().filter(|d| *d != 0.0).collect();
    let n = diffs.len();
    if n == 0 {
        return None;
    }

    let (ranks, tie_groups) = average_ranks(&diffs);
    let r_plus: f64 = diffs
        .iter()
        .zip(&ranks)
        .filter(|(d, _)| **d > 0.0)
        .map(|(_, r)| r)
        .sum();
    let total = (n * (n + 1)) as f64 / 2.0;
    let r_minus = total - r_plus;
    let statistic = r_plus.min(r_minus);

    let has_ties = tie_groups.iter().any(|&t| t > 1);
    if n <= EXACT_SIGNED_RANK_MAX_N && !has_ties && !had_zeros {
        let p_value = (2.0 * exact_lower_tail(n, statistic)).min(1.0);
        return Some(WilcoxonResult {
            statistic,
            p_value,
            n,
            method: PValueMethod::Exact,
        });
    }

    let nf = n as f64;
    let expected = nf * (nf + 1.0) / 4.0;
    let tie_term: f64 = tie_groups
        .iter()
        .map(|&t| {
            let t = t as f64;
            t * t * t - t
        })
        .sum();
    let variance = nf * (nf + 1.0) * (2.0 * nf + 1.0) / 24.0 - tie_term / 48.0;
    if variance <= 0.0 {
        return None;
    }
    let z = (statistic - expected) / variance.sqrt();
    let normal = Normal::new(0.0, 1.0).ok()?;
    let p_value = (2.0 * normal.cdf(z)).min(1.0);
    Some(WilcoxonResult {
        statistic,
        p_value,
        n,
        method: PValueMethod::NormalApproximation,
    })
}

/// Ranks of `|d|` (1-based, ties averaged) and the size of each tie group.
fn average_ranks(diffs: &[f64]) -> (Vec<f64>, Vec<usize>) {
    let mut order: Vec<usize> = (0..diffs.len()).collect();
    order.sort_by(|&a, &b| diffs[a].abs().total_cmp(&diffs[b].abs()));

    let mut ranks = vec![0.0; diffs.len()];
    let mut groups = Vec::new();
    let mut start = 0;
    while start < order.len() {
        let value = diffs[order[start]].abs();
        let mut end = start + 1;
        while end < order.len() && diffs[order[end]].abs() == value {
            end += 1;
        }
        // positions start..end hold ranks start+1..=end
        let avg = (start + 1 + end) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = avg;
        }
        groups.push(end - start);
        start = end;
    }
    (ranks, groups)
}

/// P(T <= t) under the null for `n` distinct ranks.
fn exact_lower_tail(n: usize, t: f64) -> f64 {
    let max_sum = n * (n + 1) / 2;
    // counts[s] = number of subsets of {1..n} whose sum is s
    let mut counts = vec![0.0f64; max_sum + 1];
    counts[0] = 1.0;
    for k in 1..=n {
        for s in (k..=max_sum).rev() {
            counts[s] += counts[s - k];
        }
    }
    let limit = t.floor().max(0.0) as usize;
    let below: f64 = counts.iter().take(limit.min(max_sum) + 1).sum();
    below / 2f64.powi(n as i32)
}

/// Significance class of a p-value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Significance {
    /// p < 0.001
    VeryHigh,
    /// p < 0.01
    High,
    /// p < 0.05
    Significant,
    NotSignificant,
}

impl Significance {
    pub fn from_p_value(p: f64) -> Self {
        if p < 0.001 {
            Significance::VeryHigh
        } else if p < 0.01 {
            Significance::High
        } else if p < 0.05 {
            Significance::Significant
        } else {
            Significance::NotSignificant
        }
    }

    /// Conventional star marker.
    pub fn marker(&self) -> &'static str {
        match self {
            Significance::VeryHigh => "***",
            Significance::High => "**",
            Significance::Significant => "*",
            Significance::NotSignificant => "ns",
        }
    }

    pub fn is_significant(&self) -> bool {
        !matches!(self, Significance::NotSignificant)
    }
}
