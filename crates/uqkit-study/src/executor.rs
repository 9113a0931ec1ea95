use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{debug, info};
use uqkit::plan::ExecutionPlan;
use uqkit::table::render;
use uqkit::variables::ResponseVariable;

use crate::config::StudyConfig;
use crate::StudyError;

/// Runs every evaluation of a plan and returns the results table text, one
/// row per run in plan order.
pub trait ModelExecutor {
    fn run_all(&mut self, plan: &ExecutionPlan) -> Result<String, StudyError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyticModel {
    /// Generalized Rosenbrock valley, `sum 100 (x[i+1] - x[i]^2)^2 + (1 - x[i])^2`.
    Rosenbrock,
}

impl AnalyticModel {
    pub fn min_dimension(self) -> usize {
        match self {
            Self::Rosenbrock => 2,
        }
    }

    pub fn evaluate(self, x: &[f64]) -> f64 {
        match self {
            Self::Rosenbrock => x
                .windows(2)
                .map(|w| 100.0 * (w[1] - w[0] * w[0]).powi(2) + (1.0 - w[0]).powi(2))
                .sum(),
        }
    }
}

impl fmt::Display for AnalyticModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rosenbrock => f.write_str("rosenbrock"),
        }
    }
}

impl FromStr for AnalyticModel {
    type Err = StudyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rosenbrock" => Ok(Self::Rosenbrock),
            other => Err(StudyError::InvalidConfig(format!(
                "unknown analysis driver '{other}'"
            ))),
        }
    }
}

/// Evaluates a closed-form model in process, standing in for the engine.
#[derive(Debug, Clone)]
pub struct AnalyticDriver {
    model: AnalyticModel,
    response: String,
    interface: String,
}

impl AnalyticDriver {
    pub fn new(
        model: AnalyticModel,
        responses: &[ResponseVariable],
        interface: impl Into<String>,
    ) -> Result<Self, StudyError> {
        let [response] = responses else {
            return Err(StudyError::InvalidConfig(format!(
                "{model} produces exactly one response, {} requested",
                responses.len()
            )));
        };

        Ok(Self {
            model,
            response: response.name().to_string(),
            interface: interface.into(),
        })
    }
}

impl ModelExecutor for AnalyticDriver {
    fn run_all(&mut self, plan: &ExecutionPlan) -> Result<String, StudyError> {
        if plan.dimension() < self.model.min_dimension() {
            return Err(StudyError::Executor(format!(
                "{} needs at least {} variables, plan has {}",
                self.model,
                self.model.min_dimension(),
                plan.dimension()
            )));
        }

        info!(model = %self.model, runs = plan.len(), "evaluating analytic model");
        let values = plan
            .runs()
            .iter()
            .map(|run| self.model.evaluate(&run.values))
            .collect();

        Ok(render(plan, &self.interface, &[(self.response.clone(), values)])?)
    }
}

/// Runs a closure per plan entry. The closure returns the model's output
/// series, which each response reduces with its own statistic.
pub struct FnDriver<F> {
    model: F,
    responses: Vec<ResponseVariable>,
    interface: String,
}

impl<F> FnDriver<F>
where
    F: FnMut(&[f64]) -> Vec<f64>,
{
    pub fn new(responses: Vec<ResponseVariable>, model: F) -> Self {
        Self {
            model,
            responses,
            interface: "direct".to_string(),
        }
    }

    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = interface.into();
        self
    }
}

impl<F> ModelExecutor for FnDriver<F>
where
    F: FnMut(&[f64]) -> Vec<f64>,
{
    fn run_all(&mut self, plan: &ExecutionPlan) -> Result<String, StudyError> {
        let mut columns: Vec<(String, Vec<f64>)> = self
            .responses
            .iter()
            .map(|r| (r.name().to_string(), Vec::with_capacity(plan.len())))
            .collect();

        for run in plan.runs() {
            let series = (self.model)(&run.values);
            debug!(run = run.run_id, points = series.len(), "model run finished");
            for (response, (_, column)) in self.responses.iter().zip(columns.iter_mut()) {
                column.push(response.statistic().apply(&series)?);
            }
        }

        Ok(render(plan, &self.interface, &columns)?)
    }
}

/// Replays a results table already written by an external engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableFile {
    path: PathBuf,
}

impl TableFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ModelExecutor for TableFile {
    fn run_all(&mut self, plan: &ExecutionPlan) -> Result<String, StudyError> {
        info!(
            path = %self.path.display(),
            planned_runs = plan.len(),
            "replaying results table"
        );
        Ok(fs::read_to_string(&self.path)?)
    }
}

/// Picks the executor for `config`: a results table when given, otherwise
/// the configured analytic driver.
pub fn executor_for(
    config: &StudyConfig,
    table: Option<&Path>,
) -> Result<Box<dyn ModelExecutor>, StudyError> {
    if let Some(path) = table {
        return Ok(Box::new(TableFile::new(path)));
    }

    match &config.analysis_driver {
        Some(name) => {
            let model: AnalyticModel = name.parse()?;
            let driver = AnalyticDriver::new(model, &config.responses()?, config.interface.clone())?;
            Ok(Box::new(driver))
        }
        None => Err(StudyError::InvalidConfig(
            "no analysis_driver configured; pass the engine's results table instead".to_string(),
        )),
    }
}
