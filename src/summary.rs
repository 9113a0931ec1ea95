//! Statistical summarizer
//!
//! Moments, a Student-t confidence interval for the mean, type-7 quantiles,
//! binned PDF/CDF and recurrence intervals of one response column. Columns
//! evaluated at quadrature nodes are summarized against the node weights.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::error::UqError;

pub const DEFAULT_CONFIDENCE_LEVEL: f64 = 0.95;
pub const DEFAULT_HISTOGRAM_BINS: usize = 20;

/// Probability levels reported by the standard experiments.
pub const DEFAULT_PROBABILITY_LEVELS: [f64; 7] = [0.05, 0.10, 0.33, 0.50, 0.67, 0.90, 0.95];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramOptions {
    pub bins: usize,
    /// Fixed `(lower, upper)` range; values outside it are not counted.
    pub range: Option<(f64, f64)>,
}

impl Default for HistogramOptions {
    fn default() -> Self {
        Self {
            bins: DEFAULT_HISTOGRAM_BINS,
            range: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryOptions {
    pub confidence_level: f64,
    pub probability_levels: Vec<f64>,
    /// Levels at which P(X <= level) is reported.
    pub response_levels: Vec<f64>,
    pub histogram: HistogramOptions,
    /// Observation span D of a recurrence interval. When set, the values
    /// are exceedance counts.
    pub duration: Option<f64>,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            confidence_level: DEFAULT_CONFIDENCE_LEVEL,
            probability_levels: DEFAULT_PROBABILITY_LEVELS.to_vec(),
            response_levels: Vec::new(),
            histogram: HistogramOptions::default(),
            duration: None,
        }
    }
}

impl SummaryOptions {
    pub fn validate(&self) -> Result<(), UqError> {
        ensure_open_unit("confidence level", self.confidence_level)?;
        for &p in &self.probability_levels {
            ensure_open_unit("probability level", p)?;
        }
        if let Some(level) = self.response_levels.iter().find(|l| !l.is_finite()) {
            return Err(UqError::config(format!("response level {level} is not finite")));
        }
        if let Some(duration) = self.duration {
            ensure_duration(duration)?;
        }
        self.histogram.validate()
    }
}

impl HistogramOptions {
    pub fn validate(&self) -> Result<(), UqError> {
        if self.bins == 0 {
            return Err(UqError::config("histogram needs at least one bin"));
        }
        if let Some((lo, hi)) = self.range {
            if !lo.is_finite() || !hi.is_finite() || lo >= hi {
                return Err(UqError::config(format!(
                    "histogram range ({lo}, {hi}) must be finite and increasing"
                )));
            }
        }
        Ok(())
    }
}

fn ensure_open_unit(what: &str, value: f64) -> Result<(), UqError> {
    if value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(UqError::config(format!("{what} {value} must lie strictly between 0 and 1")))
    }
}

fn ensure_duration(duration: f64) -> Result<(), UqError> {
    if duration.is_finite() && duration >= 0.0 {
        Ok(())
    } else {
        Err(UqError::config(format!("duration {duration} must be finite and non-negative")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConfidenceInterval {
    pub level: f64,
    pub lower: f64,
    pub upper: f64,
}

impl ConfidenceInterval {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Quantile {
    pub probability: f64,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LevelProbability {
    pub level: f64,
    /// Fraction of values at or below `level`.
    pub probability: f64,
}

/// Equal-width bins with density and cumulative mass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    pub edges: Vec<f64>,
    pub counts: Vec<usize>,
    pub pdf: Vec<f64>,
    pub cdf: Vec<f64>,
}

impl Histogram {
    pub fn build(values: &[f64], options: &HistogramOptions) -> Result<Self, UqError> {
        Self::tally(values, None, options)
    }

    /// Bins `values` with the probability mass of `weights` instead of one
    /// unit per value. `counts` still records how many values fell in a bin.
    pub fn build_weighted(
        values: &[f64],
        weights: &[f64],
        options: &HistogramOptions,
    ) -> Result<Self, UqError> {
        ensure_weights(values.len(), weights)?;
        Self::tally(values, Some(weights), options)
    }

    fn tally(
        values: &[f64],
        weights: Option<&[f64]>,
        options: &HistogramOptions,
    ) -> Result<Self, UqError> {
        options.validate()?;
        if values.is_empty() {
            return Err(UqError::insufficient("histogram of an empty sample"));
        }

        let (lo, hi) = match options.range {
            Some(range) => range,
            None => {
                let (min, max) = min_max(values);
                if min == max {
                    (min - 0.5, max + 0.5)
                } else {
                    (min, max)
                }
            }
        };

        let bins = options.bins;
        let span = hi - lo;
        let mut edges: Vec<f64> = (0..=bins)
            .map(|i| lo + span * i as f64 / bins as f64)
            .collect();
        edges[bins] = hi;

        let mut counts = vec![0usize; bins];
        let mut mass = vec![0.0; bins];
        for (idx, &v) in values.iter().enumerate() {
            if v < lo || v > hi {
                continue;
            }
            // The last bin is closed on the right.
            let bin = (((v - lo) / span * bins as f64).floor() as usize).min(bins - 1);
            counts[bin] += 1;
            mass[bin] += weights.map_or(1.0, |w| w[idx]);
        }

        let total: f64 = mass.iter().sum();
        if counts.iter().all(|&c| c == 0) || total <= 0.0 {
            return Err(UqError::insufficient(format!(
                "no values fall inside the histogram range ({lo}, {hi})"
            )));
        }

        let pdf = mass
            .iter()
            .zip(edges.windows(2))
            .map(|(&m, edge)| m / (total * (edge[1] - edge[0])))
            .collect();

        let mut running = 0.0;
        let cdf = mass
            .iter()
            .map(|&m| {
                running += m;
                running / total
            })
            .collect();

        Ok(Self {
            edges,
            counts,
            pdf,
            cdf,
        })
    }

    pub fn bins(&self) -> usize {
        self.counts.len()
    }

    pub fn centers(&self) -> Vec<f64> {
        self.edges.windows(2).map(|e| 0.5 * (e[0] + e[1])).collect()
    }
}

/// Everything reported for one response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryStatistics {
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    /// Student-t interval of the mean. Weighted summaries carry none: their
    /// mean is a quadrature rule, not a sample estimate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_interval: Option<ConfidenceInterval>,
    pub quantiles: Vec<Quantile>,
    pub level_probabilities: Vec<LevelProbability>,
    pub histogram: Histogram,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurrence_interval: Option<f64>,
}

pub fn summarize(values: &[f64], options: &SummaryOptions) -> Result<SummaryStatistics, UqError> {
    options.validate()?;
    ensure_sample(values)?;

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let median = quantile_sorted(&sorted, 0.5);
    let recurrence_interval = match options.duration {
        Some(duration) => Some(recurrence_interval(duration, median)?),
        None => None,
    };

    Ok(SummaryStatistics {
        count: values.len(),
        mean: mean(values)?,
        std_dev: std_dev(values)?,
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        median,
        confidence_interval: Some(confidence_interval(values, options.confidence_level)?),
        quantiles: options
            .probability_levels
            .iter()
            .map(|&probability| Quantile {
                probability,
                value: quantile_sorted(&sorted, probability),
            })
            .collect(),
        level_probabilities: options
            .response_levels
            .iter()
            .map(|&level| LevelProbability {
                level,
                probability: fraction_at_or_below(&sorted, level),
            })
            .collect(),
        histogram: Histogram::build(values, &options.histogram)?,
        recurrence_interval,
    })
}

fn ensure_sample(values: &[f64]) -> Result<(), UqError> {
    if values.len() < 2 {
        return Err(UqError::insufficient(format!(
            "at least two values are required, got {}",
            values.len()
        )));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(UqError::insufficient("sample contains non-finite values"));
    }
    Ok(())
}

/// Summary of a column whose entries carry probability `weights`, such as
/// responses at Gauss-Legendre nodes. Weights are normalized to sum to one;
/// the standard deviation is that of the weighted measure and quantiles
/// invert the weighted step CDF.
pub fn summarize_weighted(
    values: &[f64],
    weights: &[f64],
    options: &SummaryOptions,
) -> Result<SummaryStatistics, UqError> {
    options.validate()?;
    ensure_sample(values)?;
    ensure_weights(values.len(), weights)?;

    let total: f64 = weights.iter().sum();
    let mut pairs: Vec<(f64, f64)> = values
        .iter()
        .zip(weights)
        .map(|(&v, &w)| (v, w / total))
        .collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mean: f64 = pairs.iter().map(|(v, w)| v * w).sum();
    let variance: f64 = pairs.iter().map(|(v, w)| w * (v - mean).powi(2)).sum();
    let median = weighted_quantile_sorted(&pairs, 0.5);
    let recurrence_interval = match options.duration {
        Some(duration) => Some(recurrence_interval(duration, median)?),
        None => None,
    };

    Ok(SummaryStatistics {
        count: values.len(),
        mean,
        std_dev: variance.sqrt(),
        min: pairs[0].0,
        max: pairs[pairs.len() - 1].0,
        median,
        confidence_interval: None,
        quantiles: options
            .probability_levels
            .iter()
            .map(|&probability| Quantile {
                probability,
                value: weighted_quantile_sorted(&pairs, probability),
            })
            .collect(),
        level_probabilities: options
            .response_levels
            .iter()
            .map(|&level| LevelProbability {
                level,
                probability: pairs.iter().filter(|(v, _)| *v <= level).map(|(_, w)| w).sum(),
            })
            .collect(),
        histogram: Histogram::build_weighted(values, weights, &options.histogram)?,
        recurrence_interval,
    })
}

fn ensure_weights(len: usize, weights: &[f64]) -> Result<(), UqError> {
    if weights.len() != len {
        return Err(UqError::config(format!(
            "{} weights for {len} values",
            weights.len()
        )));
    }
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err(UqError::config("weights must be finite and non-negative"));
    }
    if weights.iter().sum::<f64>() <= 0.0 {
        return Err(UqError::insufficient("weights carry no probability mass"));
    }
    Ok(())
}

/// Smallest value whose cumulative weight reaches `p`, over `(value,
/// normalized weight)` pairs in ascending value order.
fn weighted_quantile_sorted(pairs: &[(f64, f64)], p: f64) -> f64 {
    let mut cumulative = 0.0;
    for &(value, weight) in pairs {
        cumulative += weight;
        if cumulative >= p - 1e-12 {
            return value;
        }
    }
    pairs[pairs.len() - 1].0
}

pub fn mean(values: &[f64]) -> Result<f64, UqError> {
    if values.is_empty() {
        return Err(UqError::insufficient("mean of an empty sample"));
    }
    Ok(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation with the n - 1 denominator.
pub fn std_dev(values: &[f64]) -> Result<f64, UqError> {
    if values.len() < 2 {
        return Err(UqError::insufficient(
            "standard deviation needs at least two values",
        ));
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Ok((ss / (values.len() - 1) as f64).sqrt())
}

/// Two-sided Student-t interval for the mean.
pub fn confidence_interval(values: &[f64], level: f64) -> Result<ConfidenceInterval, UqError> {
    ensure_open_unit("confidence level", level)?;
    let m = mean(values)?;
    let sd = std_dev(values)?;
    let n = values.len() as f64;

    let dist = StudentsT::new(0.0, 1.0, n - 1.0)
        .map_err(|e| UqError::config(format!("invalid t distribution: {e}")))?;
    let t = dist.inverse_cdf(0.5 + 0.5 * level);
    let half_width = t * sd / n.sqrt();

    Ok(ConfidenceInterval {
        level,
        lower: m - half_width,
        upper: m + half_width,
    })
}

/// Hyndman-Fan type 7 quantile of an ascending sample.
fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
    let h = (sorted.len() - 1) as f64 * p;
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

pub fn quantiles(values: &[f64], levels: &[f64]) -> Result<Vec<Quantile>, UqError> {
    if values.is_empty() {
        return Err(UqError::insufficient("quantiles of an empty sample"));
    }
    for &p in levels {
        ensure_open_unit("probability level", p)?;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    Ok(levels
        .iter()
        .map(|&probability| Quantile {
            probability,
            value: quantile_sorted(&sorted, probability),
        })
        .collect())
}

fn fraction_at_or_below(sorted: &[f64], level: f64) -> f64 {
    sorted.partition_point(|&v| v <= level) as f64 / sorted.len() as f64
}

/// Empirical P(X <= level).
pub fn empirical_cdf(values: &[f64], level: f64) -> Result<f64, UqError> {
    if values.is_empty() {
        return Err(UqError::insufficient("empirical CDF of an empty sample"));
    }
    let at_or_below = values.iter().filter(|&&v| v <= level).count();
    Ok(at_or_below as f64 / values.len() as f64)
}

/// Recurrence interval `(duration + 1) / count` of an event seen `count`
/// times over `duration` time units.
pub fn recurrence_interval(duration: f64, count: f64) -> Result<f64, UqError> {
    ensure_duration(duration)?;
    if !count.is_finite() || count < 0.0 {
        return Err(UqError::config(format!(
            "exceedance count {count} must be finite and non-negative"
        )));
    }
    if count == 0.0 {
        return Err(UqError::UndefinedRecurrence { duration });
    }
    Ok((duration + 1.0) / count)
}

pub fn recurrence_intervals(duration: f64, counts: &[f64]) -> Result<Vec<f64>, UqError> {
    counts
        .iter()
        .map(|&count| recurrence_interval(duration, count))
        .collect()
}

fn min_max(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        })
}
