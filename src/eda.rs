//! Exploratory data analysis plots using Plotters
//!
//! Produces a fixed set of named plot files. Each plot is independent and
//! best-effort: a failed write is logged and the remaining plots are still
//! attempted.

use std::path::Path;

use plotters::prelude::*;
use polars::prelude::*;
use tracing::{info, warn};

use crate::config::{LABEL_COLUMN, NUMERIC_COLUMNS};

const PLOT_SIZE: (u32, u32) = (1000, 600);
const HISTOGRAM_BINS: usize = 20;

/// Render all EDA plots into `eda_dir`, creating the directory if needed.
///
/// Always returns `Ok`: plot failures are reported through the log, per the
/// per-plot best-effort contract.
pub fn generate_eda_report(df: &DataFrame, eda_dir: &Path) -> crate::Result<()> {
    if let Err(e) = std::fs::create_dir_all(eda_dir) {
        warn!("could not create EDA directory {}: {e}", eda_dir.display());
        return Ok(());
    }

    let plots: [(&str, anyhow::Result<()>); 5] = [
        (
            "churn_distribution.png",
            label_distribution(df, &eda_dir.join("churn_distribution.png")),
        ),
        (
            "marital_status_distribution.png",
            categorical_distribution(
                df,
                "Marital_Status",
                &eda_dir.join("marital_status_distribution.png"),
            ),
        ),
        (
            "customer_age_distribution.png",
            numeric_histogram(df, "Customer_Age", &eda_dir.join("customer_age_distribution.png")),
        ),
        ("heatmap.png", correlation_heatmap(df, &eda_dir.join("heatmap.png"))),
        (
            "total_transaction_distribution.png",
            numeric_histogram(
                df,
                "Total_Trans_Ct",
                &eda_dir.join("total_transaction_distribution.png"),
            ),
        ),
    ];

    for (name, result) in plots {
        match result {
            Ok(()) => info!("EDA plot written: {}", eda_dir.join(name).display()),
            Err(e) => warn!("EDA plot {name} failed: {e:#}"),
        }
    }

    Ok(())
}

fn numeric_column(df: &DataFrame, name: &str) -> anyhow::Result<Vec<f64>> {
    let series = df.column(name)?.cast(&DataType::Float64)?;
    Ok(series.f64()?.into_no_null_iter().collect())
}

/// Bar chart of the binary label counts.
fn label_distribution(df: &DataFrame, path: &Path) -> anyhow::Result<()> {
    let labels = numeric_column(df, LABEL_COLUMN)?;
    let churned = labels.iter().filter(|&&v| v >= 0.5).count();
    let retained = labels.len() - churned;
    let max_count = churned.max(retained).max(1) as f64;

    let root = BitMapBackend::new(path, PLOT_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Churn Distribution", ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(-0.5f64..1.5f64, 0f64..max_count * 1.1)?;

    chart
        .configure_mesh()
        .x_desc(LABEL_COLUMN)
        .y_desc("Customers")
        .x_labels(2)
        .x_label_formatter(&|x| if *x < 0.5 { "0".to_string() } else { "1".to_string() })
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    for (value, count) in [(0.0, retained), (1.0, churned)] {
        chart.draw_series(std::iter::once(Rectangle::new(
            [(value - 0.3, 0.0), (value + 0.3, count as f64)],
            BLUE.filled(),
        )))?;
    }

    root.present()?;
    Ok(())
}

/// Normalized value-count bar chart for a categorical column.
fn categorical_distribution(df: &DataFrame, column: &str, path: &Path) -> anyhow::Result<()> {
    let series = df.column(column)?;
    let ca = series.str()?;

    let mut counts: Vec<(String, usize)> = Vec::new();
    for value in ca.into_iter().flatten() {
        match counts.iter_mut().find(|(name, _)| name == value) {
            Some((_, count)) => *count += 1,
            None => counts.push((value.to_string(), 1)),
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    let total: usize = counts.iter().map(|(_, c)| c).sum();
    let total = total.max(1) as f64;
    let max_fraction = counts
        .iter()
        .map(|(_, c)| *c as f64 / total)
        .fold(0.0f64, f64::max)
        .max(1e-9);

    let root = BitMapBackend::new(path, PLOT_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let categories: Vec<String> = counts.iter().map(|(name, _)| name.clone()).collect();
    let mut chart = ChartBuilder::on(&root)
        .caption(format!("{column} Distribution"), ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(60)
        .y_label_area_size(60)
        .build_cartesian_2d(-0.5f64..categories.len() as f64 - 0.5, 0f64..max_fraction * 1.1)?;

    chart
        .configure_mesh()
        .x_desc(column)
        .y_desc("Fraction of customers")
        .x_labels(categories.len())
        .x_label_formatter(&|x| {
            let idx = x.round() as isize;
            if idx >= 0 && (idx as usize) < categories.len() {
                categories[idx as usize].clone()
            } else {
                String::new()
            }
        })
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    for (idx, (_, count)) in counts.iter().enumerate() {
        let fraction = *count as f64 / total;
        chart.draw_series(std::iter::once(Rectangle::new(
            [(idx as f64 - 0.3, 0.0), (idx as f64 + 0.3, fraction)],
            GREEN.filled(),
        )))?;
    }

    root.present()?;
    Ok(())
}

/// Fixed-bin histogram of a numeric column.
fn numeric_histogram(df: &DataFrame, column: &str, path: &Path) -> anyhow::Result<()> {
    let values = numeric_column(df, column)?;
    if values.is_empty() {
        anyhow::bail!("column `{column}` has no values to plot");
    }

    let min = values.iter().fold(f64::INFINITY, |a, &b| a.min(b));
    let max = values.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
    let span = (max - min).max(1e-9);
    let bin_width = span / HISTOGRAM_BINS as f64;

    let mut bins = vec![0usize; HISTOGRAM_BINS];
    for &value in &values {
        let bin = (((value - min) / bin_width) as usize).min(HISTOGRAM_BINS - 1);
        bins[bin] += 1;
    }
    let max_count = *bins.iter().max().unwrap_or(&1) as f64;

    let root = BitMapBackend::new(path, PLOT_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(format!("{column} Distribution"), ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(min..max, 0f64..max_count * 1.1)?;

    chart
        .configure_mesh()
        .x_desc(column)
        .y_desc("Customers")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    for (idx, &count) in bins.iter().enumerate() {
        if count == 0 {
            continue;
        }
        let x0 = min + idx as f64 * bin_width;
        chart.draw_series(std::iter::once(Rectangle::new(
            [(x0, 0.0), (x0 + bin_width, count as f64)],
            BLUE.filled(),
        )))?;
    }

    root.present()?;
    Ok(())
}

/// Pearson correlation heatmap over the numeric columns plus the label.
fn correlation_heatmap(df: &DataFrame, path: &Path) -> anyhow::Result<()> {
    let mut names: Vec<&str> = NUMERIC_COLUMNS.to_vec();
    names.push(LABEL_COLUMN);

    let mut columns = Vec::with_capacity(names.len());
    for name in &names {
        columns.push(numeric_column(df, name)?);
    }

    let corr = correlation_matrix(&columns);
    let n = corr.len();

    let root = BitMapBackend::new(path, (900, 900)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Correlation Heatmap", ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(120)
        .y_label_area_size(120)
        .build_cartesian_2d(0f64..n as f64, 0f64..n as f64)?;

    let label_names: Vec<String> = names.iter().map(|s| s.to_string()).collect();
    let x_names = label_names.clone();
    let y_names = label_names;
    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels(n)
        .y_labels(n)
        .x_label_formatter(&move |x| {
            let idx = *x as usize;
            x_names.get(idx).cloned().unwrap_or_default()
        })
        .y_label_formatter(&move |y| {
            let idx = *y as usize;
            y_names.get(idx).cloned().unwrap_or_default()
        })
        .label_style(("sans-serif", 10))
        .draw()?;

    for (i, row) in corr.iter().enumerate() {
        for (j, &value) in row.iter().enumerate() {
            chart.draw_series(std::iter::once(Rectangle::new(
                [(j as f64, i as f64), (j as f64 + 1.0, i as f64 + 1.0)],
                correlation_color(value).filled(),
            )))?;
        }
    }

    root.present()?;
    Ok(())
}

/// Map a correlation in [-1, 1] to a blue-white-red gradient.
fn correlation_color(value: f64) -> RGBColor {
    let v = value.clamp(-1.0, 1.0);
    if v >= 0.0 {
        let t = v;
        RGBColor(255, (255.0 * (1.0 - t)) as u8, (255.0 * (1.0 - t)) as u8)
    } else {
        let t = -v;
        RGBColor((255.0 * (1.0 - t)) as u8, (255.0 * (1.0 - t)) as u8, 255)
    }
}

/// Pairwise Pearson correlation; constant columns correlate as 0 with
/// everything except themselves.
fn correlation_matrix(columns: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n = columns.len();
    let mut matrix = vec![vec![0.0; n]; n];

    for i in 0..n {
        for j in 0..n {
            if i == j {
                matrix[i][j] = 1.0;
            } else if j > i {
                matrix[i][j] = pearson(&columns[i], &columns[j]);
            } else {
                matrix[i][j] = matrix[j][i];
            }
        }
    }

    matrix
}

fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n == 0 {
        return 0.0;
    }
    let nf = n as f64;
    let mean_a = a[..n].iter().sum::<f64>() / nf;
    let mean_b = b[..n].iter().sum::<f64>() / nf;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for k in 0..n {
        let da = a[k] - mean_a;
        let db = b[k] - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }

    if var_a <= 0.0 || var_b <= 0.0 {
        return 0.0;
    }
    cov / (var_a.sqrt() * var_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pearson_known_values() {
        let a = vec![1.0, 2.0, 3.0, 4.0];
        let b = vec![2.0, 4.0, 6.0, 8.0];
        assert!((pearson(&a, &b) - 1.0).abs() < 1e-12);

        let c = vec![8.0, 6.0, 4.0, 2.0];
        assert!((pearson(&a, &c) + 1.0).abs() < 1e-12);

        let constant = vec![5.0; 4];
        assert_eq!(pearson(&a, &constant), 0.0);
    }

    #[test]
    fn test_correlation_matrix_symmetric() {
        let columns = vec![
            vec![1.0, 2.0, 3.0, 4.0],
            vec![4.0, 3.0, 2.0, 1.0],
            vec![1.0, 3.0, 2.0, 4.0],
        ];
        let matrix = correlation_matrix(&columns);
        for i in 0..3 {
            assert_eq!(matrix[i][i], 1.0);
            for j in 0..3 {
                assert!((matrix[i][j] - matrix[j][i]).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_correlation_color_extremes() {
        assert_eq!(correlation_color(1.0), RGBColor(255, 0, 0));
        assert_eq!(correlation_color(-1.0), RGBColor(0, 0, 255));
        assert_eq!(correlation_color(0.0), RGBColor(255, 255, 255));
    }
}
