//! Study pipeline
//!
//! config -> design -> plan -> executor -> ingest -> summaries, grids and
//! Sobol indices -> files in the run directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};
use uqkit::design::generate;
use uqkit::interp::interpolate;
use uqkit::plan::{plan, ExecutionPlan, RunBlock};
use uqkit::sensitivity::{sobol_indices, SensitivityReport};
use uqkit::summary::{
    recurrence_interval, summarize, summarize_weighted, SummaryOptions, SummaryStatistics,
};
use uqkit::table::ingest;
use uqkit::variables::ResponseVariable;
use uqkit::UqError;

use crate::config::StudyConfig;
use crate::executor::ModelExecutor;
use crate::output::{
    file_stem, write_grid_csv, write_histogram_csv, write_plan_csv, write_results_table,
    write_scatter_csv, write_sensitivity_csv, write_summary_json,
};
use crate::StudyError;

#[derive(Debug, Clone, Serialize)]
pub struct ResponseReport {
    pub name: String,
    pub statistic: String,
    pub summary: SummaryStatistics,
    /// Why no recurrence interval was reported for an exceedance count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurrence_note: Option<String>,
    /// Lattice nodes with a value, when a response surface was built.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grid_nodes_defined: Option<usize>,
    /// Distribution of the per-run recurrence intervals of an exceedance
    /// count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<RecurrenceReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensitivity: Option<SensitivityReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecurrenceReport {
    /// Runs with no exceedance, left out of the distribution.
    pub undefined_runs: usize,
    pub summary: SummaryStatistics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grid_nodes_defined: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudyReport {
    pub method: String,
    pub seed: u64,
    pub variables: Vec<String>,
    pub runs: usize,
    pub base_samples: usize,
    pub output_dir: PathBuf,
    pub model_parameters: BTreeMap<String, serde_json::Value>,
    pub responses: Vec<ResponseReport>,
}

/// Runs one study end to end and writes its products into `output_dir`.
pub fn run_study(
    config: &StudyConfig,
    executor: &mut dyn ModelExecutor,
    output_dir: &Path,
) -> Result<StudyReport, StudyError> {
    let design = config.to_design()?;
    let matrix = generate(&design);
    info!(
        method = %design.kind(),
        samples = matrix.len(),
        variables = design.dimension(),
        seed = design.seed(),
        "design generated"
    );

    let plan = plan(&design, &matrix)?;
    info!(
        runs = plan.len(),
        decomposed = plan.is_decomposed(),
        "plan expanded"
    );
    write_plan_csv(&output_dir.join("plan.csv"), &plan)?;

    let raw = executor.run_all(&plan)?;
    write_results_table(&output_dir.join("results.dat"), &raw)?;

    let table = ingest(&raw)?;
    table.check_plan(&plan)?;
    info!(rows = table.row_count(), "table ingested");

    let base_rows = base_rows(&plan);
    let mut responses = Vec::with_capacity(design.responses().len());
    for response in design.responses() {
        let column = table.column(response.name())?;
        let report = analyze_response(config, &plan, response, column, &base_rows, output_dir)?;
        responses.push(report);
    }
    info!(responses = responses.len(), "summaries computed");

    let report = StudyReport {
        method: design.kind().to_string(),
        seed: design.seed(),
        variables: design.variable_names(),
        runs: plan.len(),
        base_samples: plan.base_samples(),
        output_dir: output_dir.to_path_buf(),
        model_parameters: config.model_parameters.clone(),
        responses,
    };
    write_summary_json(&output_dir.join("summary.json"), &report)?;
    info!(output_dir = %output_dir.display(), "files written");

    Ok(report)
}

/// Runs describing the design itself: block A of a variance-based plan,
/// otherwise every run.
fn base_rows(plan: &ExecutionPlan) -> std::ops::Range<usize> {
    let block = if plan.is_decomposed() {
        RunBlock::Base
    } else {
        RunBlock::Sample
    };
    plan.block_range(&block).unwrap_or(0..plan.len())
}

fn analyze_response(
    config: &StudyConfig,
    plan: &ExecutionPlan,
    response: &ResponseVariable,
    column: &[f64],
    base_rows: &std::ops::Range<usize>,
    output_dir: &Path,
) -> Result<ResponseReport, StudyError> {
    let name = response.name();
    let stem = file_stem(name);
    let values = &column[base_rows.clone()];
    let weights = plan.weights().map(|w| &w[base_rows.clone()]);

    let mut options = config.summary_options(response);
    let mut recurrence_note = None;
    let summary = match summarize_column(values, weights, &options) {
        Err(UqError::UndefinedRecurrence { duration }) => {
            let note = format!("no exceedances over {duration}; recurrence interval undefined");
            warn!(response = name, "{}", note);
            recurrence_note = Some(note);
            options.duration = None;
            summarize_column(values, weights, &options)?
        }
        other => other?,
    };
    write_histogram_csv(&output_dir.join(format!("histogram_{stem}.csv")), &summary.histogram)?;

    let points = Points::of(plan, base_rows);
    let grid_nodes_defined = match &points {
        Some(points) => surface(config, points, name, values, output_dir)?,
        None => None,
    };

    let recurrence = match config.summary_options(response).duration {
        Some(duration) => recurrence_distribution(
            config,
            name,
            duration,
            values,
            weights,
            points.as_ref(),
            output_dir,
        )?,
        None => None,
    };

    let sensitivity = if config.variance_based_decomp {
        match sobol_indices(plan, column) {
            Ok(report) => {
                write_sensitivity_csv(&output_dir.join(format!("sensitivity_{stem}.csv")), &report)?;
                Some(report)
            }
            Err(UqError::InsufficientData(reason)) => {
                warn!(response = name, %reason, "sensitivity indices skipped");
                None
            }
            Err(err) => return Err(err.into()),
        }
    } else {
        None
    };

    info!(
        response = name,
        mean = summary.mean,
        std_dev = summary.std_dev,
        weighted = weights.is_some(),
        "response summarized"
    );

    Ok(ResponseReport {
        name: name.to_string(),
        statistic: response.statistic().label().to_string(),
        summary,
        recurrence_note,
        grid_nodes_defined,
        recurrence,
        sensitivity,
    })
}

/// Quadrature columns are summarized against their node weights, sampled
/// columns as equiprobable draws.
fn summarize_column(
    values: &[f64],
    weights: Option<&[f64]>,
    options: &SummaryOptions,
) -> Result<SummaryStatistics, UqError> {
    match weights {
        Some(weights) => summarize_weighted(values, weights, options),
        None => summarize(values, options),
    }
}

/// Per-run recurrence intervals `(D + 1) / count`, then their summary,
/// histogram and surface. Runs with a zero count have no interval and are
/// left out.
fn recurrence_distribution(
    config: &StudyConfig,
    name: &str,
    duration: f64,
    counts: &[f64],
    weights: Option<&[f64]>,
    points: Option<&Points>,
    output_dir: &Path,
) -> Result<Option<RecurrenceReport>, StudyError> {
    let mut kept = Vec::with_capacity(counts.len());
    let mut intervals = Vec::with_capacity(counts.len());
    for (idx, &count) in counts.iter().enumerate() {
        match recurrence_interval(duration, count) {
            Ok(ri) => {
                kept.push(idx);
                intervals.push(ri);
            }
            Err(UqError::UndefinedRecurrence { .. }) => {}
            Err(err) => return Err(err.into()),
        }
    }

    let undefined_runs = counts.len() - kept.len();
    if undefined_runs > 0 {
        warn!(
            response = name,
            undefined_runs, "runs without exceedances have no recurrence interval"
        );
    }

    let ri_name = format!("{name}_ri");
    let weights: Option<Vec<f64>> = weights.map(|w| kept.iter().map(|&i| w[i]).collect());
    let options = config.recurrence_summary_options();
    let summary = match summarize_column(&intervals, weights.as_deref(), &options) {
        Ok(summary) => summary,
        Err(UqError::InsufficientData(reason)) => {
            warn!(response = %ri_name, %reason, "recurrence interval distribution skipped");
            return Ok(None);
        }
        Err(err) => return Err(err.into()),
    };
    let stem = file_stem(&ri_name);
    write_histogram_csv(&output_dir.join(format!("histogram_{stem}.csv")), &summary.histogram)?;

    let grid_nodes_defined = match points {
        Some(points) => surface(config, &points.subset(&kept), &ri_name, &intervals, output_dir)?,
        None => None,
    };

    info!(
        response = %ri_name,
        mean = summary.mean,
        median = summary.median,
        undefined_runs,
        "recurrence intervals summarized"
    );

    Ok(Some(RecurrenceReport {
        undefined_runs,
        summary,
        grid_nodes_defined,
    }))
}

/// Coordinates of the analyzed runs in the first two variables.
struct Points {
    axes: (String, String),
    x: Vec<f64>,
    y: Vec<f64>,
}

impl Points {
    fn of(plan: &ExecutionPlan, rows: &std::ops::Range<usize>) -> Option<Self> {
        let [x_name, y_name, ..] = plan.names() else {
            return None;
        };
        let runs = &plan.runs()[rows.clone()];
        Some(Self {
            axes: (x_name.clone(), y_name.clone()),
            x: runs.iter().map(|run| run.values[0]).collect(),
            y: runs.iter().map(|run| run.values[1]).collect(),
        })
    }

    fn subset(&self, keep: &[usize]) -> Self {
        Self {
            axes: self.axes.clone(),
            x: keep.iter().map(|&i| self.x[i]).collect(),
            y: keep.iter().map(|&i| self.y[i]).collect(),
        }
    }
}

/// Interpolates a response over the first two variables. Designs whose
/// points cannot be triangulated, such as a vector sweep, get no surface.
fn surface(
    config: &StudyConfig,
    points: &Points,
    name: &str,
    values: &[f64],
    output_dir: &Path,
) -> Result<Option<usize>, StudyError> {
    let grid = match interpolate(&points.x, &points.y, values, &config.grid_spec(), config.interpolation) {
        Ok(grid) => grid,
        Err(UqError::InsufficientData(reason)) => {
            warn!(response = name, %reason, "response surface skipped");
            return Ok(None);
        }
        Err(err) => return Err(err.into()),
    };

    let stem = file_stem(name);
    let axes = (points.axes.0.as_str(), points.axes.1.as_str());
    write_grid_csv(&output_dir.join(format!("grid_{stem}.csv")), axes, name, &grid)?;
    write_scatter_csv(&output_dir.join(format!("scatter_{stem}.csv")), axes, name, &grid.scatter)?;
    Ok(Some(grid.defined_nodes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{executor_for, FnDriver, TableFile};
    use crate::presets::preset;
    use approx::assert_relative_eq;
    use std::fs;
    use uqkit::sensitivity::SensitivityMethod;

    fn additive_config(method: &str) -> StudyConfig {
        StudyConfig {
            method: method.to_string(),
            descriptors: vec!["x1".to_string(), "x2".to_string()],
            lower_bounds: vec![0.0, 0.0],
            upper_bounds: vec![1.0, 1.0],
            samples: 1000,
            seed: 11,
            variance_based_decomp: true,
            response_descriptors: vec!["y".to_string()],
            grid_shape: (8, 8),
            ..StudyConfig::default()
        }
    }

    fn additive(x: &[f64]) -> Vec<f64> {
        vec![4.0 * x[0] + x[1]]
    }

    #[test]
    fn rosenbrock_sweep_runs_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let config = preset("rosenbrock-vector").unwrap();
        let mut executor = executor_for(&config, None).unwrap();

        let report = run_study(&config, executor.as_mut(), dir.path()).unwrap();
        assert_eq!(report.runs, 11);
        assert_eq!(report.method, "vector");
        let y1 = &report.responses[0];
        assert_eq!(y1.summary.count, 11);
        assert!(y1.summary.min <= y1.summary.max);
        // Sweep points are collinear.
        assert_eq!(y1.grid_nodes_defined, None);
        assert!(y1.sensitivity.is_none());

        for file in ["plan.csv", "results.dat", "summary.json", "histogram_y1.csv"] {
            assert!(dir.path().join(file).is_file(), "{file}");
        }
        assert!(!dir.path().join("grid_y1.csv").exists());
    }

    #[test]
    fn sampling_decomposition_recovers_additive_shares() {
        let dir = tempfile::tempdir().unwrap();
        let config = additive_config("lhs");
        let mut driver = FnDriver::new(config.responses().unwrap(), additive);

        let report = run_study(&config, &mut driver, dir.path()).unwrap();
        assert_eq!(report.runs, 4000);
        assert_eq!(report.base_samples, 1000);

        let y = &report.responses[0];
        assert_eq!(y.summary.count, 1000);
        assert_relative_eq!(y.summary.mean, 2.5, epsilon = 0.05);
        assert_eq!(y.grid_nodes_defined.map(|n| n > 0), Some(true));

        let sensitivity = y.sensitivity.as_ref().unwrap();
        assert_eq!(sensitivity.method, SensitivityMethod::Sampling);
        let x1 = sensitivity.index("x1").unwrap();
        let x2 = sensitivity.index("x2").unwrap();
        assert_relative_eq!(x1.total_effect, 16.0 / 17.0, epsilon = 0.1);
        assert_relative_eq!(x2.total_effect, 1.0 / 17.0, epsilon = 0.1);
        assert!(x1.first_order > x2.first_order);

        assert!(dir.path().join("sensitivity_y.csv").is_file());
        assert!(dir.path().join("grid_y.csv").is_file());
        assert!(dir.path().join("scatter_y.csv").is_file());
    }

    #[test]
    fn quadrature_decomposition_is_exact_for_linear_models() {
        let dir = tempfile::tempdir().unwrap();
        let config = StudyConfig {
            quadrature_order: 3,
            ..additive_config("quadrature")
        };
        let mut driver = FnDriver::new(config.responses().unwrap(), additive);

        let report = run_study(&config, &mut driver, dir.path()).unwrap();
        assert_eq!(report.runs, 9);

        assert_relative_eq!(report.responses[0].summary.mean, 2.5, epsilon = 1e-10);
        let sensitivity = report.responses[0].sensitivity.as_ref().unwrap();
        assert_eq!(sensitivity.method, SensitivityMethod::Spectral);
        assert_relative_eq!(sensitivity.mean, 2.5, epsilon = 1e-10);
        let x1 = sensitivity.index("x1").unwrap();
        assert_relative_eq!(x1.first_order, 16.0 / 17.0, epsilon = 1e-9);
        assert_relative_eq!(x1.total_effect, 16.0 / 17.0, epsilon = 1e-9);
    }

    #[test]
    fn summary_json_matches_report() {
        let dir = tempfile::tempdir().unwrap();
        let config = StudyConfig {
            samples: 50,
            variance_based_decomp: false,
            ..additive_config("random")
        };
        let mut driver = FnDriver::new(config.responses().unwrap(), additive);
        let report = run_study(&config, &mut driver, dir.path()).unwrap();

        let raw = fs::read_to_string(dir.path().join("summary.json")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["runs"], 50);
        assert_eq!(json["method"], "random");
        assert_eq!(json["responses"][0]["summary"]["count"], 50);
        assert_eq!(report.responses[0].sensitivity, None);
        assert!(json["responses"][0].get("sensitivity").is_none());
    }

    #[test]
    fn zero_exceedances_leave_recurrence_undefined() {
        let dir = tempfile::tempdir().unwrap();
        let config = StudyConfig {
            samples: 20,
            variance_based_decomp: false,
            response_statistics: vec!["exceedance_count".to_string()],
            response_thresholds: vec![100.0],
            run_duration: Some(1000.0),
            ..additive_config("lhs")
        };
        let mut driver = FnDriver::new(config.responses().unwrap(), |x: &[f64]| {
            (0..30).map(|day| x[0] * day as f64).collect()
        });

        let report = run_study(&config, &mut driver, dir.path()).unwrap();
        let counts = &report.responses[0];
        assert_eq!(counts.summary.recurrence_interval, None);
        assert!(counts.recurrence_note.is_some());
        assert_eq!(counts.summary.max, 0.0);
        assert!(counts.recurrence.is_none());
    }

    #[test]
    fn recurrence_intervals_are_summarized_per_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = preset("hydrotrend-ri").unwrap();
        // 8T + 20P days above the threshold: between 131 and 163 per run.
        let mut driver = FnDriver::new(config.responses().unwrap(), |x: &[f64]| {
            let wet_days = 8.0 * x[0] + 20.0 * x[1];
            (0..1000)
                .map(|day| if (day as f64) < wet_days { 50.0 } else { 0.0 })
                .collect()
        });

        let report = run_study(&config, &mut driver, dir.path()).unwrap();
        let response = &report.responses[0];
        let recurrence = response.recurrence.as_ref().unwrap();
        assert_eq!(recurrence.undefined_runs, 0);
        assert_eq!(recurrence.summary.count, 100);

        let raw = fs::read_to_string(dir.path().join("results.dat")).unwrap();
        let table = ingest(&raw).unwrap();
        let counts = table.column(&response.name).unwrap();
        let intervals: Vec<f64> = counts.iter().map(|c| 1001.0 / c).collect();
        let mean = intervals.iter().sum::<f64>() / intervals.len() as f64;
        assert_relative_eq!(recurrence.summary.mean, mean, epsilon = 1e-9);
        assert!(recurrence.summary.min > 6.0 && recurrence.summary.max < 8.0);
        assert!(recurrence.summary.confidence_interval.is_some());

        // Fixed binning range and every interval inside it.
        let histogram = &recurrence.summary.histogram;
        assert_eq!(histogram.edges[0], 4.0);
        assert_eq!(histogram.edges[histogram.bins()], 14.0);
        assert_eq!(histogram.counts.iter().sum::<usize>(), 100);

        // The scalar interval still follows the median count.
        assert_relative_eq!(
            response.summary.recurrence_interval.unwrap(),
            1001.0 / response.summary.median,
            epsilon = 1e-12
        );

        assert_eq!(recurrence.grid_nodes_defined.map(|n| n > 0), Some(true));
        let stem = file_stem(&format!("{}_ri", response.name));
        for file in [format!("histogram_{stem}.csv"), format!("grid_{stem}.csv")] {
            assert!(dir.path().join(&file).is_file(), "{file}");
        }

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("summary.json")).unwrap())
                .unwrap();
        assert_eq!(json["responses"][0]["recurrence"]["summary"]["count"], 100);
    }

    #[test]
    fn quadrature_summaries_use_node_weights() {
        let dir = tempfile::tempdir().unwrap();
        let config = StudyConfig {
            descriptors: vec!["x1".to_string()],
            lower_bounds: vec![0.0],
            upper_bounds: vec![1.0],
            quadrature_order: 4,
            variance_based_decomp: false,
            ..additive_config("quadrature")
        };
        let mut driver = FnDriver::new(config.responses().unwrap(), |x: &[f64]| vec![x[0]]);

        let report = run_study(&config, &mut driver, dir.path()).unwrap();
        let summary = &report.responses[0].summary;
        assert_eq!(summary.count, 4);
        assert_relative_eq!(summary.mean, 0.5, epsilon = 1e-12);
        assert_relative_eq!(summary.std_dev, (1.0f64 / 12.0).sqrt(), epsilon = 1e-12);
        assert_eq!(summary.confidence_interval, None);

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("summary.json")).unwrap())
                .unwrap();
        assert!(json["responses"][0]["summary"].get("confidence_interval").is_none());
    }

    #[test]
    fn short_results_table_is_an_expansion_error() {
        let dir = tempfile::tempdir().unwrap();
        let table = dir.path().join("dakota.dat");
        fs::write(&table, "%eval_id interface x1 x2 y\n1 NO_ID 0.1 0.2 0.3\n").unwrap();
        let config = StudyConfig {
            samples: 5,
            variance_based_decomp: false,
            ..additive_config("lhs")
        };
        let mut replay = TableFile::new(&table);

        assert!(matches!(
            run_study(&config, &mut replay, dir.path()),
            Err(StudyError::Uq(UqError::Expansion { .. }))
        ));
    }
}
