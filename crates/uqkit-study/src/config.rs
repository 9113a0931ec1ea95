use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, OneOrMany};
use uqkit::design::{DesignKind, DesignMethod, ExperimentDesign, DEFAULT_VECTOR_STEPS};
use uqkit::interp::{GridSpec, InterpolationMethod, DEFAULT_GRID_SIZE};
use uqkit::summary::{
    HistogramOptions, SummaryOptions, DEFAULT_CONFIDENCE_LEVEL, DEFAULT_HISTOGRAM_BINS,
    DEFAULT_PROBABILITY_LEVELS,
};
use uqkit::variables::{DistributionKind, ResponseStatistic, ResponseVariable, UncertainVariable};

use crate::StudyError;

/// Flat experiment record, keyed the way experiment dictionaries are
/// written for the execution engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StudyRecord")]
pub struct StudyConfig {
    /// Design method name: `lhs`, `random`, `vector` or `quadrature`.
    pub method: String,
    pub descriptors: Vec<String>,
    pub variable_type: DistributionKind,
    pub lower_bounds: Vec<f64>,
    pub upper_bounds: Vec<f64>,
    pub samples: usize,
    pub seed: u64,
    pub probability_levels: Vec<f64>,
    pub response_levels: Vec<f64>,
    pub response_descriptors: Vec<String>,
    /// `max`, `median`, `mean` or `exceedance_count`; one entry applies to
    /// every response.
    pub response_statistics: Vec<String>,
    /// Thresholds of `exceedance_count` responses.
    pub response_thresholds: Vec<f64>,
    /// Model run length. Also the duration of recurrence intervals of
    /// exceedance-count responses.
    pub run_duration: Option<f64>,
    pub quadrature_order: usize,
    pub variance_based_decomp: bool,
    pub initial_point: Vec<f64>,
    pub final_point: Vec<f64>,
    pub num_steps: usize,
    /// Built-in analytic model; `None` means an external engine writes the
    /// results table.
    pub analysis_driver: Option<String>,
    pub interface: String,
    pub histogram_bins: usize,
    pub histogram_range: Option<(f64, f64)>,
    /// Binning range of the per-run recurrence intervals.
    pub recurrence_histogram_range: Option<(f64, f64)>,
    pub grid_shape: (usize, usize),
    pub grid_x_range: Option<(f64, f64)>,
    pub grid_y_range: Option<(f64, f64)>,
    pub confidence_level: f64,
    pub interpolation: InterpolationMethod,
    /// Passed through to the model untouched.
    pub model_parameters: BTreeMap<String, serde_json::Value>,
}

/// Wire form of [`StudyConfig`]. Absent and `null` keys both fall back to
/// the value in `StudyConfig::default()`.
#[serde_as]
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StudyRecord {
    #[serde(alias = "sample_type")]
    method: Option<String>,
    #[serde_as(as = "Option<OneOrMany<_>>")]
    descriptors: Option<Vec<String>>,
    variable_type: Option<DistributionKind>,
    #[serde_as(as = "Option<OneOrMany<_>>")]
    lower_bounds: Option<Vec<f64>>,
    #[serde_as(as = "Option<OneOrMany<_>>")]
    upper_bounds: Option<Vec<f64>>,
    samples: Option<usize>,
    seed: Option<u64>,
    #[serde_as(as = "Option<OneOrMany<_>>")]
    probability_levels: Option<Vec<f64>>,
    #[serde_as(as = "Option<OneOrMany<_>>")]
    response_levels: Option<Vec<f64>>,
    #[serde_as(as = "Option<OneOrMany<_>>")]
    response_descriptors: Option<Vec<String>>,
    #[serde_as(as = "Option<OneOrMany<_>>")]
    response_statistics: Option<Vec<String>>,
    #[serde_as(as = "Option<OneOrMany<_>>")]
    response_thresholds: Option<Vec<f64>>,
    run_duration: Option<f64>,
    quadrature_order: Option<usize>,
    variance_based_decomp: Option<bool>,
    initial_point: Option<Vec<f64>>,
    final_point: Option<Vec<f64>>,
    num_steps: Option<usize>,
    analysis_driver: Option<String>,
    interface: Option<String>,
    histogram_bins: Option<usize>,
    histogram_range: Option<(f64, f64)>,
    recurrence_histogram_range: Option<(f64, f64)>,
    grid_shape: Option<(usize, usize)>,
    grid_x_range: Option<(f64, f64)>,
    grid_y_range: Option<(f64, f64)>,
    confidence_level: Option<f64>,
    interpolation: Option<InterpolationMethod>,
    model_parameters: Option<BTreeMap<String, serde_json::Value>>,
}

impl From<StudyRecord> for StudyConfig {
    fn from(record: StudyRecord) -> Self {
        let defaults = StudyConfig::default();
        Self {
            method: record.method.unwrap_or(defaults.method),
            descriptors: record.descriptors.unwrap_or(defaults.descriptors),
            variable_type: record.variable_type.unwrap_or(defaults.variable_type),
            lower_bounds: record.lower_bounds.unwrap_or(defaults.lower_bounds),
            upper_bounds: record.upper_bounds.unwrap_or(defaults.upper_bounds),
            samples: record.samples.unwrap_or(defaults.samples),
            seed: record.seed.unwrap_or(defaults.seed),
            probability_levels: record
                .probability_levels
                .unwrap_or(defaults.probability_levels),
            response_levels: record.response_levels.unwrap_or(defaults.response_levels),
            response_descriptors: record
                .response_descriptors
                .unwrap_or(defaults.response_descriptors),
            response_statistics: record
                .response_statistics
                .unwrap_or(defaults.response_statistics),
            response_thresholds: record
                .response_thresholds
                .unwrap_or(defaults.response_thresholds),
            run_duration: record.run_duration.or(defaults.run_duration),
            quadrature_order: record.quadrature_order.unwrap_or(defaults.quadrature_order),
            variance_based_decomp: record
                .variance_based_decomp
                .unwrap_or(defaults.variance_based_decomp),
            initial_point: record.initial_point.unwrap_or(defaults.initial_point),
            final_point: record.final_point.unwrap_or(defaults.final_point),
            num_steps: record.num_steps.unwrap_or(defaults.num_steps),
            analysis_driver: record.analysis_driver.or(defaults.analysis_driver),
            interface: record.interface.unwrap_or(defaults.interface),
            histogram_bins: record.histogram_bins.unwrap_or(defaults.histogram_bins),
            histogram_range: record.histogram_range.or(defaults.histogram_range),
            recurrence_histogram_range: record
                .recurrence_histogram_range
                .or(defaults.recurrence_histogram_range),
            grid_shape: record.grid_shape.unwrap_or(defaults.grid_shape),
            grid_x_range: record.grid_x_range.or(defaults.grid_x_range),
            grid_y_range: record.grid_y_range.or(defaults.grid_y_range),
            confidence_level: record.confidence_level.unwrap_or(defaults.confidence_level),
            interpolation: record.interpolation.unwrap_or(defaults.interpolation),
            model_parameters: record.model_parameters.unwrap_or(defaults.model_parameters),
        }
    }
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            method: DesignKind::LatinHypercube.as_str().to_string(),
            descriptors: Vec::new(),
            variable_type: DistributionKind::Uniform,
            lower_bounds: Vec::new(),
            upper_bounds: Vec::new(),
            samples: 100,
            seed: 17,
            probability_levels: DEFAULT_PROBABILITY_LEVELS.to_vec(),
            response_levels: Vec::new(),
            response_descriptors: Vec::new(),
            response_statistics: vec!["mean".to_string()],
            response_thresholds: Vec::new(),
            run_duration: None,
            quadrature_order: 4,
            variance_based_decomp: false,
            initial_point: Vec::new(),
            final_point: Vec::new(),
            num_steps: DEFAULT_VECTOR_STEPS,
            analysis_driver: None,
            interface: "direct".to_string(),
            histogram_bins: DEFAULT_HISTOGRAM_BINS,
            histogram_range: None,
            recurrence_histogram_range: None,
            grid_shape: (DEFAULT_GRID_SIZE, DEFAULT_GRID_SIZE),
            grid_x_range: None,
            grid_y_range: None,
            confidence_level: DEFAULT_CONFIDENCE_LEVEL,
            interpolation: InterpolationMethod::Linear,
            model_parameters: BTreeMap::new(),
        }
    }
}

impl StudyConfig {
    /// Loads a JSON or TOML record, chosen by file extension.
    pub fn from_path(path: &Path) -> Result<Self, StudyError> {
        let raw = fs::read_to_string(path)?;
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        let config: StudyConfig = match extension.as_deref() {
            Some("json") => serde_json::from_str(&raw)?,
            Some("toml") => toml::from_str(&raw)?,
            _ => {
                return Err(StudyError::InvalidConfig(format!(
                    "unsupported config format: {} (expected .json or .toml)",
                    path.display()
                )))
            }
        };

        config.validate()?;
        Ok(config)
    }

    pub fn design_kind(&self) -> Result<DesignKind, StudyError> {
        Ok(self.method.parse::<DesignKind>()?)
    }

    pub fn validate(&self) -> Result<(), StudyError> {
        let kind = self.design_kind()?;

        if self.descriptors.is_empty() {
            return Err(StudyError::InvalidConfig(
                "descriptors must name at least one variable".to_string(),
            ));
        }

        let derived_bounds = kind == DesignKind::VectorSweep
            && self.lower_bounds.is_empty()
            && self.upper_bounds.is_empty();
        if !derived_bounds
            && (self.lower_bounds.len() != self.descriptors.len()
                || self.upper_bounds.len() != self.descriptors.len())
        {
            return Err(StudyError::InvalidConfig(format!(
                "{} descriptors need as many lower_bounds and upper_bounds (got {} and {})",
                self.descriptors.len(),
                self.lower_bounds.len(),
                self.upper_bounds.len()
            )));
        }

        if kind == DesignKind::VectorSweep
            && (self.initial_point.len() != self.descriptors.len()
                || self.final_point.len() != self.descriptors.len())
        {
            return Err(StudyError::InvalidConfig(
                "vector studies need initial_point and final_point with one value per descriptor"
                    .to_string(),
            ));
        }

        if self.response_descriptors.is_empty() {
            return Err(StudyError::InvalidConfig(
                "response_descriptors must name at least one response".to_string(),
            ));
        }

        if self.interface.trim().is_empty() || self.interface.contains(char::is_whitespace) {
            return Err(StudyError::InvalidConfig(
                "interface must be a single non-empty token".to_string(),
            ));
        }

        self.responses()?;
        self.base_summary_options().validate()?;
        self.recurrence_summary_options().validate()?;
        self.grid_spec().validate()?;
        Ok(())
    }

    /// Variable bounds, derived from the sweep endpoints when a vector study
    /// declares none.
    fn bounds(&self, kind: DesignKind) -> (Vec<f64>, Vec<f64>) {
        if kind != DesignKind::VectorSweep
            || !self.lower_bounds.is_empty()
            || !self.upper_bounds.is_empty()
        {
            return (self.lower_bounds.clone(), self.upper_bounds.clone());
        }

        self.initial_point
            .iter()
            .zip(&self.final_point)
            .map(|(&a, &b)| {
                if a == b {
                    (a - 0.5, b + 0.5)
                } else {
                    (a.min(b), a.max(b))
                }
            })
            .unzip()
    }

    pub fn responses(&self) -> Result<Vec<ResponseVariable>, StudyError> {
        let count = self.response_descriptors.len();
        let statistics = broadcast("response_statistics", &self.response_statistics, count)?;

        let mut thresholds = self.response_thresholds.iter().copied();
        let single_threshold = self.response_thresholds.len() == 1;
        let first_threshold = self.response_thresholds.first().copied();

        let mut responses = Vec::with_capacity(count);
        for (name, statistic) in self.response_descriptors.iter().zip(statistics) {
            let statistic = match statistic.trim().to_ascii_lowercase().as_str() {
                "max" | "maximum" => ResponseStatistic::Max,
                "median" => ResponseStatistic::Median,
                "mean" | "average" => ResponseStatistic::Mean,
                "exceedance_count" | "count" => {
                    let threshold = if single_threshold {
                        first_threshold
                    } else {
                        thresholds.next()
                    };
                    let threshold = threshold.ok_or_else(|| {
                        StudyError::InvalidConfig(format!(
                            "response '{name}' counts exceedances but has no response_threshold"
                        ))
                    })?;
                    ResponseStatistic::ExceedanceCount { threshold }
                }
                other => {
                    return Err(StudyError::InvalidConfig(format!(
                        "unknown response statistic '{other}'"
                    )))
                }
            };
            responses.push(ResponseVariable::new(name.clone(), statistic)?);
        }

        Ok(responses)
    }

    pub fn to_design(&self) -> Result<ExperimentDesign, StudyError> {
        self.validate()?;
        let kind = self.design_kind()?;
        let (lower, upper) = self.bounds(kind);

        let variables = self
            .descriptors
            .iter()
            .zip(lower.iter().zip(&upper))
            .map(|(name, (&lo, &hi))| UncertainVariable::new(name.clone(), self.variable_type, lo, hi))
            .collect::<Result<Vec<_>, _>>()?;

        let method = match kind {
            DesignKind::LatinHypercube => DesignMethod::LatinHypercube {
                samples: self.samples,
            },
            DesignKind::MonteCarlo => DesignMethod::MonteCarlo {
                samples: self.samples,
            },
            DesignKind::VectorSweep => DesignMethod::VectorSweep {
                initial_point: self.initial_point.clone(),
                final_point: self.final_point.clone(),
                steps: self.num_steps,
            },
            DesignKind::Quadrature => DesignMethod::Quadrature {
                order: self.quadrature_order,
            },
        };

        let design = ExperimentDesign::new(variables, self.responses()?, method, self.seed)?
            .with_variance_decomposition(self.variance_based_decomp)?;
        Ok(design)
    }

    fn base_summary_options(&self) -> SummaryOptions {
        SummaryOptions {
            confidence_level: self.confidence_level,
            probability_levels: self.probability_levels.clone(),
            response_levels: self.response_levels.clone(),
            histogram: HistogramOptions {
                bins: self.histogram_bins,
                range: self.histogram_range,
            },
            duration: None,
        }
    }

    /// Summary options of `response`. Exceedance counts also report the
    /// recurrence interval over `run_duration`.
    pub fn summary_options(&self, response: &ResponseVariable) -> SummaryOptions {
        let mut options = self.base_summary_options();
        if let ResponseStatistic::ExceedanceCount { .. } = response.statistic() {
            options.duration = self.run_duration;
        }
        options
    }

    /// Summary options of the per-run recurrence intervals derived from an
    /// exceedance count, binned over `recurrence_histogram_range`.
    pub fn recurrence_summary_options(&self) -> SummaryOptions {
        SummaryOptions {
            response_levels: Vec::new(),
            histogram: HistogramOptions {
                bins: self.histogram_bins,
                range: self.recurrence_histogram_range,
            },
            ..self.base_summary_options()
        }
    }

    pub fn grid_spec(&self) -> GridSpec {
        GridSpec {
            nx: self.grid_shape.0,
            ny: self.grid_shape.1,
            x_range: self.grid_x_range,
            y_range: self.grid_y_range,
        }
    }
}

fn broadcast<'a>(
    field: &str,
    values: &'a [String],
    count: usize,
) -> Result<Vec<&'a str>, StudyError> {
    match values.len() {
        0 => Ok(vec!["mean"; count]),
        1 => Ok(vec![values[0].as_str(); count]),
        n if n == count => Ok(values.iter().map(String::as_str).collect()),
        n => Err(StudyError::InvalidConfig(format!(
            "{field} has {n} entries for {count} responses"
        ))),
    }
}
