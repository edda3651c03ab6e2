//! SVG comparison charts.
//!
//! Three fixed-size charts are written to the comparison directory and
//! overwritten on every run: a box plot against the top competitors, a
//! horizontal ranking bar chart, and a scatter plot against the best
//! competitor.

use super::{Comparison, Ranking, RANKING_CHART_TOP_N, SIGNIFICANCE_POOL, SIGNIFICANCE_TOP_N};
use crate::metrics;
use plotters::prelude::*;
use std::error::Error;
use std::path::{Path, PathBuf};
use tsadbench_core::{Result, TsadError};

type PlotResult = std::result::Result<(), Box<dyn Error>>;

const LIGHT_CORAL: RGBColor = RGBColor(240, 128, 128);
const LIGHT_BLUE: RGBColor = RGBColor(173, 216, 230);
const STEEL_BLUE: RGBColor = RGBColor(70, 130, 180);
const PURPLE: RGBColor = RGBColor(128, 0, 128);

/// Output file of the box plot.
pub fn box_plot_path(dir: &Path, method: &str) -> PathBuf {
    dir.join(format!("{}_vs_top_methods.svg", method.to_lowercase()))
}

/// Output file of the ranking chart.
pub fn ranking_chart_path(dir: &Path) -> PathBuf {
    dir.join("method_ranking.svg")
}

/// Output file of the scatter plot.
pub fn scatter_plot_path(dir: &Path, method: &str) -> PathBuf {
    dir.join(format!("{}_vs_best.svg", method.to_lowercase()))
}

/// Render every chart. Each entry is the chart's path or the reason it could
/// not be drawn; one failed chart does not stop the others.
pub fn render_all(
    comparison: &Comparison,
    ranking: &Ranking,
    dir: &Path,
) -> Vec<Result<PathBuf>> {
    let ours = comparison.method();
    let top = ranking.top_competitors(SIGNIFICANCE_POOL, SIGNIFICANCE_TOP_N);

    let mut outputs = vec![
        finish(
            box_plot_path(dir, ours),
            |path| draw_box_plot(path, comparison, &top),
        ),
        finish(ranking_chart_path(dir), |path| {
            draw_ranking_chart(path, comparison, ranking)
        }),
    ];
    match top.first() {
        Some(best) => outputs.push(finish(scatter_plot_path(dir, ours), |path| {
            draw_scatter_plot(path, comparison, best)
        })),
        None => tracing::warn!("No competing method to plot against"),
    }
    outputs
}

fn finish(path: PathBuf, draw: impl FnOnce(&Path) -> PlotResult) -> Result<PathBuf> {
    draw(&path).map_err(|e| TsadError::Plot(format!("{}: {e}", path.display())))?;
    Ok(path)
}

/// Label of the category at integer position `value`, empty between ticks.
fn index_label(names: &[String], value: f64) -> String {
    let rounded = value.round();
    if (value - rounded).abs() > 1e-6 || rounded < 0.0 {
        return String::new();
    }
    names.get(rounded as usize).cloned().unwrap_or_default()
}

/// Linear-interpolated quantile of sorted, NaN-free values.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Box geometry: whiskers at the furthest points within 1.5 IQR.
struct BoxStats {
    low: f64,
    q1: f64,
    median: f64,
    q3: f64,
    high: f64,
    mean: f64,
}

impl BoxStats {
    fn of(values: &[f64]) -> Option<Self> {
        let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(f64::total_cmp);
        let q1 = quantile(&sorted, 0.25);
        let q3 = quantile(&sorted, 0.75);
        let iqr = q3 - q1;
        let low = sorted
            .iter()
            .copied()
            .find(|v| *v >= q1 - 1.5 * iqr)
            .unwrap_or(q1);
        let high = sorted
            .iter()
            .rev()
            .copied()
            .find(|v| *v <= q3 + 1.5 * iqr)
            .unwrap_or(q3);
        Some(Self {
            low,
            q1,
            median: quantile(&sorted, 0.5),
            q3,
            high,
            mean: metrics::mean(&sorted),
        })
    }
}

fn value_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if !lo.is_finite() || !hi.is_finite() {
        return (0.0, 1.0);
    }
    let (lo, hi) = (lo.min(0.0), hi.max(1.0));
    let pad = 0.05 * (hi - lo);
    (lo - pad, hi + pad)
}

fn draw_box_plot(path: &Path, comparison: &Comparison, top: &[&str]) -> PlotResult {
    let ours = comparison.method();
    let names: Vec<String> = top
        .iter()
        .map(|m| m.to_string())
        .chain(std::iter::once(ours.to_string()))
        .collect();
    let columns: Vec<Vec<f64>> = names.iter().map(|m| comparison.scores(m)).collect();
    let (y_min, y_max) = value_range(columns.iter().flatten().copied());
    let n = names.len();

    let root = SVGBackend::new(path, (1400, 600)).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(format!("{ours} vs Top Benchmark Methods"), ("sans-serif", 24))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(-0.5f64..(n as f64 - 0.5), y_min..y_max)?;

    let label = |x: &f64| index_label(&names, *x);
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(2 * n + 2)
        .x_label_formatter(&label)
        .y_desc(comparison.primary_metric())
        .light_line_style(BLACK.mix(0.05))
        .draw()?;

    let half = 0.3;
    for (idx, (name, values)) in names.iter().zip(&columns).enumerate() {
        let Some(stats) = BoxStats::of(values) else {
            continue;
        };
        let x = idx as f64;
        let highlighted = name == ours;
        let (fill, edge, width) = if highlighted {
            (LIGHT_CORAL.mix(0.8), RED, 2)
        } else {
            (LIGHT_BLUE.mix(0.6), BLACK, 1)
        };

        chart.draw_series(std::iter::once(Rectangle::new(
            [(x - half, stats.q1), (x + half, stats.q3)],
            fill.filled(),
        )))?;
        chart.draw_series(std::iter::once(Rectangle::new(
            [(x - half, stats.q1), (x + half, stats.q3)],
            edge.stroke_width(width),
        )))?;
        for (from, to) in [(stats.low, stats.q1), (stats.q3, stats.high)] {
            chart.draw_series(std::iter::once(PathElement::new(
                vec![(x, from), (x, to)],
                BLACK,
            )))?;
        }
        for cap in [stats.low, stats.high] {
            chart.draw_series(std::iter::once(PathElement::new(
                vec![(x - half / 2.0, cap), (x + half / 2.0, cap)],
                BLACK,
            )))?;
        }
        chart.draw_series(std::iter::once(PathElement::new(
            vec![(x - half, stats.median), (x + half, stats.median)],
            BLACK.stroke_width(2),
        )))?;
        chart.draw_series(std::iter::once(PathElement::new(
            vec![(x - half, stats.mean), (x + half, stats.mean)],
            RED.stroke_width(2),
        )))?;
    }

    root.present()?;
    Ok(())
}

fn draw_ranking_chart(path: &Path, comparison: &Comparison, ranking: &Ranking) -> PlotResult {
    let ours = comparison.method();
    // bars top to bottom: competitors in rank order, then this system
    let mut bars: Vec<(String, f64)> = ranking
        .competitors(RANKING_CHART_TOP_N)
        .into_iter()
        .map(|e| (e.method.clone(), e.mean))
        .collect();
    if let Some(entry) = ranking.entries().iter().find(|e| e.method == ours) {
        bars.push((entry.method.clone(), entry.mean));
    }
    let n = bars.len();
    // y position 0 is the bottom bar
    let names: Vec<String> = bars.iter().rev().map(|(m, _)| m.clone()).collect();
    let x_max = bars
        .iter()
        .map(|(_, v)| *v)
        .filter(|v| v.is_finite())
        .fold(0.0f64, f64::max)
        .max(1e-3)
        * 1.15;

    let root = SVGBackend::new(path, (1200, 800)).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!("Method Ranking by Mean {}", comparison.primary_metric()),
            ("sans-serif", 24),
        )
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(160)
        .build_cartesian_2d(0.0f64..x_max, -0.5f64..(n as f64 - 0.5))?;

    let label = |y: &f64| index_label(&names, *y);
    chart
        .configure_mesh()
        .disable_y_mesh()
        .y_labels(2 * n + 2)
        .y_label_formatter(&label)
        .x_desc(format!("Mean {}", comparison.primary_metric()))
        .light_line_style(BLACK.mix(0.05))
        .draw()?;

    for (pos, (name, mean)) in bars.iter().rev().enumerate() {
        if !mean.is_finite() {
            continue;
        }
        let y = pos as f64;
        let color = if name == ours { RED } else { STEEL_BLUE };
        chart.draw_series(std::iter::once(Rectangle::new(
            [(0.0, y - 0.4), (*mean, y + 0.4)],
            color.mix(0.7).filled(),
        )))?;
        chart.draw_series(std::iter::once(Rectangle::new(
            [(0.0, y - 0.4), (*mean, y + 0.4)],
            BLACK.stroke_width(1),
        )))?;
        chart.draw_series(std::iter::once(Text::new(
            format!("{mean:.4}"),
            (*mean + 0.01 * x_max, y),
            ("sans-serif", 13).into_font(),
        )))?;
    }

    root.present()?;
    Ok(())
}

fn draw_scatter_plot(path: &Path, comparison: &Comparison, best: &str) -> PlotResult {
    let ours = comparison.method();
    let metric = comparison.primary_metric();
    let xs = comparison.scores(best);
    let ys = comparison.scores(ours);
    let points: Vec<(f64, f64)> = xs
        .iter()
        .zip(&ys)
        .filter(|(x, y)| !x.is_nan() && !y.is_nan())
        .map(|(x, y)| (*x, *y))
        .collect();

    let root = SVGBackend::new(path, (800, 800)).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(format!("{ours} vs {best} (Best Method)"), ("sans-serif", 22))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(0.0f64..1.0f64, 0.0f64..1.0f64)?;

    chart
        .configure_mesh()
        .x_desc(format!("{best} {metric}"))
        .y_desc(format!("{ours} {metric}"))
        .light_line_style(BLACK.mix(0.05))
        .draw()?;

    chart.draw_series(LineSeries::new(
        vec![(0.0, 0.0), (1.0, 1.0)],
        BLACK.mix(0.5).stroke_width(2),
    ))?;
    chart.draw_series(
        points
            .iter()
            .map(|&(x, y)| Circle::new((x, y), 4, PURPLE.mix(0.5).filled())),
    )?;

    let annotation = match metrics::pearson(&xs, &ys) {
        Some(r) => format!("Correlation: {r:.3}"),
        None => "Correlation: n/a".to_string(),
    };
    chart.draw_series(std::iter::once(Text::new(
        annotation,
        (0.05, 0.95),
        ("sans-serif", 16).into_font(),
    )))?;

    root.present()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::Table;
    use tempfile::TempDir;

    fn comparison() -> Comparison {
        let to_rows = |rows: &[&[&str]]| -> Vec<Vec<String>> {
            rows.iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect()
        };
        let results = Table::new(
            vec!["file".to_string(), "VUS-PR".to_string()],
            to_rows(&[&["a.csv", "0.3"], &["b.csv", "0.5"], &["c.csv", "0.7"]]),
        );
        let bench = Table::new(
            vec!["file".to_string(), "LOF".to_string(), "IForest".to_string()],
            to_rows(&[
                &["a.csv", "0.2", "0.4"],
                &["b.csv", "0.6", "0.5"],
                &["c.csv", "0.4", "0.9"],
            ]),
        );
        Comparison::build(&results, &bench, "PCA", "VUS-PR").unwrap()
    }

    #[test]
    fn test_quantile_interpolates() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile(&sorted, 0.0), 1.0);
        assert_eq!(quantile(&sorted, 1.0), 4.0);
        assert!((quantile(&sorted, 0.5) - 2.5).abs() < 1e-12);
        assert!((quantile(&sorted, 0.25) - 1.75).abs() < 1e-12);
    }

    #[test]
    fn test_box_stats_whiskers_exclude_outliers() {
        let stats = BoxStats::of(&[1.0, 2.0, 3.0, 4.0, 100.0, f64::NAN]).unwrap();
        assert_eq!(stats.low, 1.0);
        assert_eq!(stats.high, 4.0);
        assert_eq!(stats.median, 3.0);
        assert!(BoxStats::of(&[f64::NAN]).is_none());
    }

    #[test]
    fn test_index_label() {
        let names = vec!["A".to_string(), "B".to_string()];
        assert_eq!(index_label(&names, 1.0), "B");
        assert_eq!(index_label(&names, 0.5), "");
        assert_eq!(index_label(&names, 2.0), "");
        assert_eq!(index_label(&names, -1.0), "");
    }

    #[test]
    fn test_render_all_writes_three_svgs() {
        let dir = TempDir::new().unwrap();
        let cmp = comparison();
        let ranking = cmp.ranking();
        let outputs = render_all(&cmp, &ranking, dir.path());
        assert_eq!(outputs.len(), 3);
        for output in outputs {
            let path = output.unwrap();
            let contents = std::fs::read_to_string(&path).unwrap();
            assert!(contents.contains("<svg"));
        }
        assert!(dir.path().join("pca_vs_top_methods.svg").exists());
        assert!(dir.path().join("method_ranking.svg").exists());
        assert!(dir.path().join("pca_vs_best.svg").exists());
    }

    #[test]
    fn test_render_into_missing_dir_reports_plot_error() {
        let dir = TempDir::new().unwrap();
        let cmp = comparison();
        let ranking = cmp.ranking();
        let outputs = render_all(&cmp, &ranking, &dir.path().join("missing"));
        assert!(outputs
            .iter()
            .all(|o| matches!(o, Err(TsadError::Plot(_)))));
    }
}
