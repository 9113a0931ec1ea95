use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use csv::Writer;
use serde::Serialize;
use uqkit::interp::InterpolationGrid;
use uqkit::plan::ExecutionPlan;
use uqkit::sensitivity::SensitivityReport;
use uqkit::summary::Histogram;

use crate::StudyError;

/// Creates `<root>/<UTC timestamp>`, suffixing a counter when a study already
/// claimed the same second.
pub fn create_timestamped_output_dir(root: &Path) -> Result<PathBuf, StudyError> {
    fs::create_dir_all(root)?;

    let timestamp = Utc::now().format("%Y-%m-%dT%H-%M-%SZ").to_string();
    let mut output_dir = root.join(&timestamp);
    let mut counter = 1_u32;

    while output_dir.exists() {
        output_dir = root.join(format!("{timestamp}-{counter:02}"));
        counter += 1;
    }

    fs::create_dir_all(&output_dir)?;
    Ok(output_dir)
}

/// File-name-safe form of a response descriptor.
pub fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

fn ensure_len(context: &'static str, expected: usize, actual: usize) -> Result<(), StudyError> {
    if expected == actual {
        return Ok(());
    }

    Err(StudyError::LengthMismatch {
        context,
        expected,
        got: actual,
    })
}

fn fmt_f64(value: f64) -> String {
    format!("{value:.10}")
}

fn fmt_option_f64(value: Option<f64>) -> String {
    value.map(fmt_f64).unwrap_or_else(|| "NA".to_string())
}

/// One row per run: id, block label, then the variable values.
pub fn write_plan_csv(path: &Path, plan: &ExecutionPlan) -> Result<(), StudyError> {
    let mut writer = Writer::from_path(path)?;
    let mut header = vec!["run_id".to_string(), "block".to_string()];
    header.extend(plan.names().iter().cloned());
    if plan.weights().is_some() {
        header.push("weight".to_string());
    }
    writer.write_record(&header)?;

    for (idx, run) in plan.runs().iter().enumerate() {
        ensure_len("plan row", plan.dimension(), run.values.len())?;
        let mut record = vec![run.run_id.to_string(), run.block.label()];
        record.extend(run.values.iter().copied().map(fmt_f64));
        if let Some(weights) = plan.weights() {
            record.push(fmt_option_f64(weights.get(idx).copied()));
        }
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

pub fn write_histogram_csv(path: &Path, histogram: &Histogram) -> Result<(), StudyError> {
    let bins = histogram.bins();
    ensure_len("histogram edges", bins + 1, histogram.edges.len())?;
    ensure_len("histogram pdf", bins, histogram.pdf.len())?;
    ensure_len("histogram cdf", bins, histogram.cdf.len())?;

    let mut writer = Writer::from_path(path)?;
    writer.write_record(["bin_lower", "bin_upper", "center", "count", "pdf", "cdf"])?;

    let centers = histogram.centers();
    for idx in 0..bins {
        writer.write_record([
            fmt_f64(histogram.edges[idx]),
            fmt_f64(histogram.edges[idx + 1]),
            fmt_f64(centers[idx]),
            histogram.counts[idx].to_string(),
            fmt_f64(histogram.pdf[idx]),
            fmt_f64(histogram.cdf[idx]),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

/// Lattice nodes as `x, y, <response>`; nodes outside the hull are `NA`.
pub fn write_grid_csv(
    path: &Path,
    axes: (&str, &str),
    response: &str,
    grid: &InterpolationGrid,
) -> Result<(), StudyError> {
    ensure_len("grid values", grid.nx() * grid.ny(), grid.values.len())?;

    let mut writer = Writer::from_path(path)?;
    writer.write_record([axes.0, axes.1, response])?;
    for j in 0..grid.ny() {
        for i in 0..grid.nx() {
            writer.write_record([
                fmt_f64(grid.x[i]),
                fmt_f64(grid.y[j]),
                fmt_option_f64(grid.value(i, j)),
            ])?;
        }
    }

    writer.flush()?;
    Ok(())
}

pub fn write_scatter_csv(
    path: &Path,
    axes: (&str, &str),
    response: &str,
    scatter: &[[f64; 3]],
) -> Result<(), StudyError> {
    let mut writer = Writer::from_path(path)?;
    writer.write_record([axes.0, axes.1, response])?;
    for point in scatter {
        writer.write_record(point.iter().copied().map(fmt_f64))?;
    }

    writer.flush()?;
    Ok(())
}

pub fn write_sensitivity_csv(path: &Path, report: &SensitivityReport) -> Result<(), StudyError> {
    let mut writer = Writer::from_path(path)?;
    writer.write_record(["variable", "first_order", "total_effect"])?;
    for index in &report.indices {
        writer.write_record([
            index.variable.clone(),
            fmt_f64(index.first_order),
            fmt_f64(index.total_effect),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

/// Keeps the engine's results table next to the derived outputs.
pub fn write_results_table(path: &Path, raw: &str) -> Result<(), StudyError> {
    fs::write(path, raw)?;
    Ok(())
}

pub fn write_summary_json<T: Serialize>(path: &Path, summary: &T) -> Result<(), StudyError> {
    let json = serde_json::to_string_pretty(summary)?;
    fs::write(path, json)?;
    Ok(())
}
