//! Parameter space descriptor
//!
//! Uncertain inputs and the response quantities tracked per model run.

use serde::{Deserialize, Serialize};

use crate::error::UqError;

/// Distribution family of an uncertain input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionKind {
    /// Uniform over `[lower, upper]`.
    #[default]
    #[serde(alias = "uniform_uncertain")]
    Uniform,
}

/// An uncertain model input with bounded support.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "VariableRecord")]
pub struct UncertainVariable {
    name: String,
    distribution: DistributionKind,
    lower: f64,
    upper: f64,
}

/// Unchecked wire form; every deserialized variable goes through `new`.
#[derive(Deserialize)]
struct VariableRecord {
    name: String,
    #[serde(default)]
    distribution: DistributionKind,
    lower: f64,
    upper: f64,
}

impl TryFrom<VariableRecord> for UncertainVariable {
    type Error = UqError;

    fn try_from(record: VariableRecord) -> Result<Self, Self::Error> {
        Self::new(record.name, record.distribution, record.lower, record.upper)
    }
}

impl UncertainVariable {
    pub fn new(
        name: impl Into<String>,
        distribution: DistributionKind,
        lower: f64,
        upper: f64,
    ) -> Result<Self, UqError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(UqError::config("variable name must not be empty"));
        }
        if !lower.is_finite() || !upper.is_finite() {
            return Err(UqError::config(format!(
                "bounds of '{name}' must be finite"
            )));
        }
        if lower >= upper {
            return Err(UqError::config(format!(
                "lower bound of '{name}' must be below its upper bound ({lower} >= {upper})"
            )));
        }

        Ok(Self {
            name,
            distribution,
            lower,
            upper,
        })
    }

    pub fn uniform(name: impl Into<String>, lower: f64, upper: f64) -> Result<Self, UqError> {
        Self::new(name, DistributionKind::Uniform, lower, upper)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn distribution(&self) -> DistributionKind {
        self.distribution
    }

    pub fn lower(&self) -> f64 {
        self.lower
    }

    pub fn upper(&self) -> f64 {
        self.upper
    }

    pub fn span(&self) -> f64 {
        self.upper - self.lower
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }

    /// Maps a unit-interval coordinate onto the variable's support.
    pub fn scale_unit(&self, u: f64) -> f64 {
        match self.distribution {
            DistributionKind::Uniform => self.lower + u * self.span(),
        }
    }
}

/// Reduction applied to a model's raw output series before it enters the
/// results table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatistic {
    Max,
    Median,
    Mean,
    /// Number of entries strictly above `threshold`.
    ExceedanceCount { threshold: f64 },
}

impl ResponseStatistic {
    pub fn apply(&self, series: &[f64]) -> Result<f64, UqError> {
        if series.is_empty() {
            return Err(UqError::insufficient(
                "cannot reduce an empty output series",
            ));
        }

        let value = match *self {
            Self::Max => series.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Self::Mean => series.iter().sum::<f64>() / series.len() as f64,
            Self::Median => {
                let mut sorted = series.to_vec();
                sorted.sort_by(f64::total_cmp);
                let mid = sorted.len() / 2;
                if sorted.len() % 2 == 0 {
                    0.5 * (sorted[mid - 1] + sorted[mid])
                } else {
                    sorted[mid]
                }
            }
            Self::ExceedanceCount { threshold } => {
                series.iter().filter(|&&v| v > threshold).count() as f64
            }
        };

        Ok(value)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Max => "max",
            Self::Median => "median",
            Self::Mean => "mean",
            Self::ExceedanceCount { .. } => "exceedance_count",
        }
    }
}

/// A named response quantity tracked across runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ResponseRecord")]
pub struct ResponseVariable {
    name: String,
    statistic: ResponseStatistic,
}

#[derive(Deserialize)]
struct ResponseRecord {
    name: String,
    statistic: ResponseStatistic,
}

impl TryFrom<ResponseRecord> for ResponseVariable {
    type Error = UqError;

    fn try_from(record: ResponseRecord) -> Result<Self, Self::Error> {
        Self::new(record.name, record.statistic)
    }
}

impl ResponseVariable {
    pub fn new(name: impl Into<String>, statistic: ResponseStatistic) -> Result<Self, UqError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(UqError::config("response name must not be empty"));
        }
        if let ResponseStatistic::ExceedanceCount { threshold } = statistic {
            if !threshold.is_finite() {
                return Err(UqError::config(format!(
                    "exceedance threshold of '{name}' must be finite"
                )));
            }
        }

        Ok(Self { name, statistic })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn statistic(&self) -> ResponseStatistic {
        self.statistic
    }
}
