//! Sample design generator
//!
//! An [`ExperimentDesign`] is validated once at construction. [`generate`]
//! dispatches on its [`DesignMethod`] and returns an immutable
//! [`SampleMatrix`] whose row order is the order runs are handed to the
//! execution collaborator.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};

use crate::error::UqError;
use crate::quadrature::{self, GaussLegendre};
use crate::variables::{ResponseVariable, UncertainVariable};

/// Default number of intervals along a vector sweep.
pub const DEFAULT_VECTOR_STEPS: usize = 10;

/// Upper limit on the node count of a tensor-product grid.
pub const MAX_QUADRATURE_NODES: usize = 1_000_000;

/// XOR mask used to derive the resample seed of a variance-based plan.
const RESAMPLE_SEED_MASK: u64 = 0x9E37_79B9_7F4A_7C15;

/// How sample points are placed in the parameter space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DesignMethod {
    LatinHypercube {
        samples: usize,
    },
    MonteCarlo {
        samples: usize,
    },
    /// Straight path from `initial_point` to `final_point` in `steps`
    /// intervals.
    VectorSweep {
        initial_point: Vec<f64>,
        final_point: Vec<f64>,
        steps: usize,
    },
    /// Tensor-product Gauss-Legendre grid, `order` points per variable.
    Quadrature {
        order: usize,
    },
}

impl DesignMethod {
    pub fn kind(&self) -> DesignKind {
        match self {
            Self::LatinHypercube { .. } => DesignKind::LatinHypercube,
            Self::MonteCarlo { .. } => DesignKind::MonteCarlo,
            Self::VectorSweep { .. } => DesignKind::VectorSweep,
            Self::Quadrature { .. } => DesignKind::Quadrature,
        }
    }
}

/// Method name without its parameters, as it appears in experiment records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesignKind {
    LatinHypercube,
    MonteCarlo,
    VectorSweep,
    Quadrature,
}

impl DesignKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LatinHypercube => "lhs",
            Self::MonteCarlo => "random",
            Self::VectorSweep => "vector",
            Self::Quadrature => "quadrature",
        }
    }

    /// Whether points are drawn from the seeded generator.
    pub fn is_random(self) -> bool {
        matches!(self, Self::LatinHypercube | Self::MonteCarlo)
    }
}

impl fmt::Display for DesignKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DesignKind {
    type Err = UqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "lhs" | "latin_hypercube" => Ok(Self::LatinHypercube),
            "random" | "monte_carlo" => Ok(Self::MonteCarlo),
            "vector" | "vector_parameter_study" | "vector_sweep" => Ok(Self::VectorSweep),
            "quadrature" | "polynomial_chaos" => Ok(Self::Quadrature),
            other => Err(UqError::config(format!(
                "unknown design method '{other}'"
            ))),
        }
    }
}

/// A validated, immutable experiment.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentDesign {
    variables: Vec<UncertainVariable>,
    responses: Vec<ResponseVariable>,
    method: DesignMethod,
    seed: u64,
    variance_decomposition: bool,
}

impl ExperimentDesign {
    pub fn new(
        variables: Vec<UncertainVariable>,
        responses: Vec<ResponseVariable>,
        method: DesignMethod,
        seed: u64,
    ) -> Result<Self, UqError> {
        if variables.is_empty() {
            return Err(UqError::config("at least one uncertain variable is required"));
        }
        ensure_unique("variable", variables.iter().map(UncertainVariable::name))?;
        ensure_unique("response", responses.iter().map(ResponseVariable::name))?;
        validate_method(&method, &variables)?;

        Ok(Self {
            variables,
            responses,
            method,
            seed,
            variance_decomposition: false,
        })
    }

    /// Requests variance-based decomposition. Vector sweeps do not cover the
    /// parameter space and are rejected.
    pub fn with_variance_decomposition(mut self, enabled: bool) -> Result<Self, UqError> {
        if enabled && self.method.kind() == DesignKind::VectorSweep {
            return Err(UqError::config(
                "variance-based decomposition requires a sampling or quadrature design",
            ));
        }
        self.variance_decomposition = enabled;
        Ok(self)
    }

    pub fn variables(&self) -> &[UncertainVariable] {
        &self.variables
    }

    pub fn responses(&self) -> &[ResponseVariable] {
        &self.responses
    }

    pub fn method(&self) -> &DesignMethod {
        &self.method
    }

    pub fn kind(&self) -> DesignKind {
        self.method.kind()
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn variance_decomposition(&self) -> bool {
        self.variance_decomposition
    }

    pub fn dimension(&self) -> usize {
        self.variables.len()
    }

    pub fn variable_names(&self) -> Vec<String> {
        self.variables.iter().map(|v| v.name().to_string()).collect()
    }

    /// Number of rows [`generate`] produces.
    pub fn sample_count(&self) -> usize {
        match &self.method {
            DesignMethod::LatinHypercube { samples } | DesignMethod::MonteCarlo { samples } => {
                *samples
            }
            DesignMethod::VectorSweep { steps, .. } => steps + 1,
            // Bounded by MAX_QUADRATURE_NODES at construction.
            DesignMethod::Quadrature { order } => order.pow(self.variables.len() as u32),
        }
    }

    /// Seed of the independent resample matrix B of a variance-based plan.
    pub fn resample_seed(&self) -> u64 {
        self.seed ^ RESAMPLE_SEED_MASK
    }
}

fn ensure_unique<'a>(what: &str, names: impl Iterator<Item = &'a str>) -> Result<(), UqError> {
    let mut seen = BTreeSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(UqError::config(format!("duplicate {what} name '{name}'")));
        }
    }
    Ok(())
}

fn validate_method(method: &DesignMethod, variables: &[UncertainVariable]) -> Result<(), UqError> {
    match method {
        DesignMethod::LatinHypercube { samples } | DesignMethod::MonteCarlo { samples } => {
            if *samples == 0 {
                return Err(UqError::config("sample count must be positive"));
            }
        }
        DesignMethod::VectorSweep {
            initial_point,
            final_point,
            steps,
        } => {
            if *steps == 0 {
                return Err(UqError::config("vector sweep needs at least one step"));
            }
            for (label, point) in [("initial", initial_point), ("final", final_point)] {
                if point.len() != variables.len() {
                    return Err(UqError::config(format!(
                        "{label} point has {} coordinates for {} variables",
                        point.len(),
                        variables.len()
                    )));
                }
                for (var, &value) in variables.iter().zip(point.iter()) {
                    if !var.contains(value) {
                        return Err(UqError::config(format!(
                            "{label} point value {value} lies outside the bounds of '{}'",
                            var.name()
                        )));
                    }
                }
            }
        }
        DesignMethod::Quadrature { order } => {
            if *order == 0 || *order > quadrature::MAX_ORDER {
                return Err(UqError::config(format!(
                    "quadrature order must be in 1..={}, got {order}",
                    quadrature::MAX_ORDER
                )));
            }
            let mut nodes: usize = 1;
            for _ in variables {
                nodes = nodes.saturating_mul(*order);
            }
            if nodes > MAX_QUADRATURE_NODES {
                return Err(UqError::config(format!(
                    "quadrature grid of order {order} over {} variables exceeds {MAX_QUADRATURE_NODES} nodes",
                    variables.len()
                )));
            }
        }
    }
    Ok(())
}

/// Ordered sample points, one column per variable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleMatrix {
    names: Vec<String>,
    rows: Vec<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    weights: Option<Vec<f64>>,
}

impl SampleMatrix {
    pub(crate) fn new(names: Vec<String>, rows: Vec<Vec<f64>>, weights: Option<Vec<f64>>) -> Self {
        Self {
            names,
            rows,
            weights,
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Product quadrature weights, present for quadrature designs only.
    pub fn weights(&self) -> Option<&[f64]> {
        self.weights.as_deref()
    }

    pub fn column(&self, index: usize) -> Option<Vec<f64>> {
        if index >= self.names.len() {
            return None;
        }
        Some(self.rows.iter().map(|row| row[index]).collect())
    }

    pub fn column_by_name(&self, name: &str) -> Option<Vec<f64>> {
        let index = self.names.iter().position(|n| n == name)?;
        self.column(index)
    }

    /// Value of `name` in sample `row`.
    pub fn value(&self, row: usize, name: &str) -> Option<f64> {
        let index = self.names.iter().position(|n| n == name)?;
        self.rows.get(row).map(|values| values[index])
    }

    /// Sample `row` as `(name, value)` pairs in variable order.
    pub fn point(&self, row: usize) -> Option<Vec<(&str, f64)>> {
        let values = self.rows.get(row)?;
        Some(
            self.names
                .iter()
                .map(String::as_str)
                .zip(values.iter().copied())
                .collect(),
        )
    }
}

/// Generates the sample matrix of `design` from its own seed.
pub fn generate(design: &ExperimentDesign) -> SampleMatrix {
    generate_with_seed(design, design.seed())
}

/// Generates the sample matrix of `design` with an explicit seed. Seeds are
/// ignored by the deterministic vector and quadrature designs.
pub fn generate_with_seed(design: &ExperimentDesign, seed: u64) -> SampleMatrix {
    let variables = design.variables();
    let names = design.variable_names();

    match design.method() {
        DesignMethod::LatinHypercube { samples } => {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let unit = latin_hypercube_unit(*samples, variables.len(), &mut rng);
            let rows = unit
                .into_iter()
                .map(|u| scale_row(variables, &u))
                .collect();
            SampleMatrix::new(names, rows, None)
        }
        DesignMethod::MonteCarlo { samples } => {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let unit_interval = Uniform::new(0.0, 1.0);
            let rows = (0..*samples)
                .map(|_| {
                    variables
                        .iter()
                        .map(|var| var.scale_unit(unit_interval.sample(&mut rng)))
                        .collect()
                })
                .collect();
            SampleMatrix::new(names, rows, None)
        }
        DesignMethod::VectorSweep {
            initial_point,
            final_point,
            steps,
        } => {
            let rows = (0..=*steps)
                .map(|k| {
                    let t = k as f64 / *steps as f64;
                    initial_point
                        .iter()
                        .zip(final_point.iter())
                        .map(|(&a, &b)| a * (1.0 - t) + b * t)
                        .collect()
                })
                .collect();
            SampleMatrix::new(names, rows, None)
        }
        DesignMethod::Quadrature { order } => tensor_grid(variables, names, *order),
    }
}

/// Latin hypercube on the unit cube. Each column holds one draw from every
/// stratum `[k/n, (k+1)/n)`, in an independently shuffled order.
pub(crate) fn latin_hypercube_unit<R: Rng + ?Sized>(
    samples: usize,
    dims: usize,
    rng: &mut R,
) -> Vec<Vec<f64>> {
    let mut rows = vec![vec![0.0; dims]; samples];
    let n = samples as f64;
    let jitter = Uniform::new(0.0, 1.0);

    for dim in 0..dims {
        let mut strata: Vec<usize> = (0..samples).collect();
        strata.shuffle(rng);
        for (row, stratum) in rows.iter_mut().zip(strata) {
            row[dim] = (stratum as f64 + jitter.sample(rng)) / n;
        }
    }

    rows
}

fn scale_row(variables: &[UncertainVariable], unit: &[f64]) -> Vec<f64> {
    variables
        .iter()
        .zip(unit.iter())
        .map(|(var, &u)| var.scale_unit(u))
        .collect()
}

fn tensor_grid(variables: &[UncertainVariable], names: Vec<String>, order: usize) -> SampleMatrix {
    // Order was validated against quadrature::MAX_ORDER at construction.
    let rule = GaussLegendre::build(order);
    let dims = variables.len();
    let count = order.pow(dims as u32);
    let mut rows = Vec::with_capacity(count);
    let mut weights = Vec::with_capacity(count);

    for row in 0..count {
        let index = quadrature::tensor_index(row, order, dims);
        let values = variables
            .iter()
            .zip(index.iter())
            .map(|(var, &i)| var.scale_unit(rule.nodes[i]))
            .collect();
        let weight = index.iter().map(|&i| rule.weights[i]).product();
        rows.push(values);
        weights.push(weight);
    }

    SampleMatrix::new(names, rows, Some(weights))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn hydrotrend_variables() -> Vec<UncertainVariable> {
        vec![
            UncertainVariable::uniform("T", 10.7, 17.8).unwrap(),
            UncertainVariable::uniform("P", 1.19, 1.99).unwrap(),
        ]
    }

    fn lhs_design(samples: usize, seed: u64) -> ExperimentDesign {
        ExperimentDesign::new(
            hydrotrend_variables(),
            Vec::new(),
            DesignMethod::LatinHypercube { samples },
            seed,
        )
        .unwrap()
    }

    #[test]
    fn latin_hypercube_is_reproducible() {
        let first = generate(&lhs_design(100, 17));
        let second = generate(&lhs_design(100, 17));
        assert_eq!(first, second);

        let other = generate(&lhs_design(100, 18));
        assert_ne!(first, other);
    }

    #[test]
    fn samples_stay_inside_bounds() {
        let design = lhs_design(50, 3);
        let matrix = generate(&design);
        assert_eq!(matrix.len(), 50);
        for row in 0..matrix.len() {
            for (var, (_, value)) in design.variables().iter().zip(matrix.point(row).unwrap()) {
                assert!(var.contains(value), "{value} outside {}", var.name());
            }
        }
    }

    #[test]
    fn monte_carlo_is_reproducible_and_bounded() {
        let design = ExperimentDesign::new(
            hydrotrend_variables(),
            Vec::new(),
            DesignMethod::MonteCarlo { samples: 64 },
            2026,
        )
        .unwrap();
        let first = generate(&design);
        assert_eq!(first, generate(&design));
        let temperature = first.column_by_name("T").unwrap();
        assert!(temperature.iter().all(|&t| (10.7..17.8).contains(&t)));
    }

    #[test]
    fn vector_sweep_hits_both_endpoints() {
        let variables = vec![
            UncertainVariable::uniform("x1", -0.3, 1.1).unwrap(),
            UncertainVariable::uniform("x2", 0.2, 1.3).unwrap(),
        ];
        let design = ExperimentDesign::new(
            variables,
            Vec::new(),
            DesignMethod::VectorSweep {
                initial_point: vec![-0.3, 0.2],
                final_point: vec![1.1, 1.3],
                steps: DEFAULT_VECTOR_STEPS,
            },
            0,
        )
        .unwrap();
        let matrix = generate(&design);

        assert_eq!(matrix.len(), 11);
        assert_eq!(design.sample_count(), 11);
        assert_eq!(matrix.rows()[0], vec![-0.3, 0.2]);
        assert_eq!(matrix.rows()[10], vec![1.1, 1.3]);
        assert_relative_eq!(matrix.value(5, "x1").unwrap(), 0.4, epsilon = 1e-12);
    }

    #[test]
    fn vector_sweep_rejects_points_outside_bounds() {
        let err = ExperimentDesign::new(
            hydrotrend_variables(),
            Vec::new(),
            DesignMethod::VectorSweep {
                initial_point: vec![10.7, 1.19],
                final_point: vec![20.0, 1.99],
                steps: 4,
            },
            0,
        )
        .unwrap_err();
        assert!(matches!(err, UqError::Configuration(_)));
    }

    #[test]
    fn quadrature_grid_has_normalized_weights() {
        let design = ExperimentDesign::new(
            hydrotrend_variables(),
            Vec::new(),
            DesignMethod::Quadrature { order: 4 },
            0,
        )
        .unwrap();
        let matrix = generate(&design);
        assert_eq!(matrix.len(), 16);

        let weights = matrix.weights().unwrap();
        assert_relative_eq!(weights.iter().sum::<f64>(), 1.0, epsilon = 1e-13);

        // E[T] over the grid equals the midpoint of its bounds.
        let mean_t: f64 = matrix
            .column_by_name("T")
            .unwrap()
            .iter()
            .zip(weights)
            .map(|(t, w)| t * w)
            .sum();
        assert_relative_eq!(mean_t, 0.5 * (10.7 + 17.8), epsilon = 1e-12);
    }

    #[test]
    fn oversized_quadrature_grid_is_rejected() {
        let variables = (0..8)
            .map(|i| UncertainVariable::uniform(format!("x{i}"), 0.0, 1.0).unwrap())
            .collect();
        let err =
            ExperimentDesign::new(variables, Vec::new(), DesignMethod::Quadrature { order: 10 }, 0)
                .unwrap_err();
        assert!(matches!(err, UqError::Configuration(_)));
    }

    #[test]
    fn invalid_designs_are_rejected() {
        assert!(ExperimentDesign::new(
            Vec::new(),
            Vec::new(),
            DesignMethod::MonteCarlo { samples: 10 },
            0
        )
        .is_err());
        assert!(ExperimentDesign::new(
            hydrotrend_variables(),
            Vec::new(),
            DesignMethod::LatinHypercube { samples: 0 },
            0
        )
        .is_err());

        let duplicate = vec![
            UncertainVariable::uniform("T", 0.0, 1.0).unwrap(),
            UncertainVariable::uniform("T", 0.0, 2.0).unwrap(),
        ];
        assert!(ExperimentDesign::new(
            duplicate,
            Vec::new(),
            DesignMethod::MonteCarlo { samples: 10 },
            0
        )
        .is_err());
    }

    #[test]
    fn vector_sweep_cannot_be_decomposed() {
        let design = ExperimentDesign::new(
            hydrotrend_variables(),
            Vec::new(),
            DesignMethod::VectorSweep {
                initial_point: vec![10.7, 1.19],
                final_point: vec![17.8, 1.99],
                steps: 2,
            },
            0,
        )
        .unwrap();
        assert!(design.with_variance_decomposition(true).is_err());
    }

    #[test]
    fn method_names_parse() {
        assert_eq!("lhs".parse::<DesignKind>().unwrap(), DesignKind::LatinHypercube);
        assert_eq!("random".parse::<DesignKind>().unwrap(), DesignKind::MonteCarlo);
        assert_eq!(
            "vector_parameter_study".parse::<DesignKind>().unwrap(),
            DesignKind::VectorSweep
        );
        assert_eq!(
            "polynomial_chaos".parse::<DesignKind>().unwrap(),
            DesignKind::Quadrature
        );
        assert!(matches!(
            "sparse_grid".parse::<DesignKind>(),
            Err(UqError::Configuration(_))
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn every_stratum_is_used_once(samples in 1usize..200, dims in 1usize..5, seed in any::<u64>()) {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let unit = latin_hypercube_unit(samples, dims, &mut rng);
            prop_assert_eq!(unit.len(), samples);

            for dim in 0..dims {
                let mut hits = vec![0usize; samples];
                for row in &unit {
                    let u = row[dim];
                    prop_assert!((0.0..1.0).contains(&u));
                    let stratum = ((u * samples as f64).floor() as usize).min(samples - 1);
                    hits[stratum] += 1;
                }
                prop_assert!(hits.iter().all(|&h| h == 1));
            }
        }
    }
}
