//! Variance-based sensitivity analysis
//!
//! Sampling plans use the Saltelli (2010) first-order and Jansen total-effect
//! estimators over the A, B, A_B(i) blocks. Quadrature plans integrate the
//! conditional moments directly on the tensor grid.

use serde::Serialize;

use crate::error::{ensure_len, UqError};
use crate::plan::{ExecutionPlan, RunBlock};
use crate::quadrature::GaussLegendre;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SensitivityMethod {
    Sampling,
    Spectral,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SobolIndex {
    pub variable: String,
    pub first_order: f64,
    pub total_effect: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensitivityReport {
    pub method: SensitivityMethod,
    pub mean: f64,
    pub variance: f64,
    pub indices: Vec<SobolIndex>,
}

impl SensitivityReport {
    pub fn index(&self, variable: &str) -> Option<&SobolIndex> {
        self.indices.iter().find(|i| i.variable == variable)
    }
}

/// Sobol indices of one response column, aligned with the runs of `plan`.
pub fn sobol_indices(plan: &ExecutionPlan, responses: &[f64]) -> Result<SensitivityReport, UqError> {
    ensure_len("sensitivity response", plan.len(), responses.len())?;
    if responses.iter().any(|v| !v.is_finite()) {
        return Err(UqError::insufficient("responses contain non-finite values"));
    }

    if plan.is_decomposed() {
        sampling_indices(plan, responses)
    } else if let Some(weights) = plan.weights() {
        spectral_indices(plan, weights, responses)
    } else {
        Err(UqError::config(
            "plan carries neither a variance-based layout nor quadrature weights",
        ))
    }
}

fn block<'a>(plan: &ExecutionPlan, responses: &'a [f64], which: RunBlock) -> Result<&'a [f64], UqError> {
    let range = plan
        .block_range(&which)
        .ok_or_else(|| UqError::config(format!("plan has no {} block", which.label())))?;
    Ok(&responses[range])
}

fn sampling_indices(plan: &ExecutionPlan, responses: &[f64]) -> Result<SensitivityReport, UqError> {
    let f_a = block(plan, responses, RunBlock::Base)?;
    let f_b = block(plan, responses, RunBlock::Resample)?;
    let n = f_a.len() as f64;

    let pooled = f_a.iter().chain(f_b);
    let mean = pooled.clone().sum::<f64>() / (2.0 * n);
    let variance = pooled.map(|v| (v - mean).powi(2)).sum::<f64>() / (2.0 * n);
    if variance <= 0.0 {
        return Err(UqError::insufficient(
            "response variance is zero; indices are undefined",
        ));
    }

    let mut indices = Vec::with_capacity(plan.dimension());
    for (variable, name) in plan.names().iter().enumerate() {
        let f_ab = block(plan, responses, RunBlock::Substituted { variable })?;

        let mut first = 0.0;
        let mut total = 0.0;
        for ((&a, &b), &ab) in f_a.iter().zip(f_b).zip(f_ab) {
            first += (b - mean) * (ab - a);
            total += (a - ab).powi(2);
        }

        indices.push(SobolIndex {
            variable: name.clone(),
            first_order: first / n / variance,
            total_effect: total / n / (2.0 * variance),
        });
    }

    Ok(SensitivityReport {
        method: SensitivityMethod::Sampling,
        mean,
        variance,
        indices,
    })
}

fn spectral_indices(
    plan: &ExecutionPlan,
    weights: &[f64],
    responses: &[f64],
) -> Result<SensitivityReport, UqError> {
    let dims = plan.dimension();
    let nodes = responses.len();
    let order = grid_order(nodes, dims)?;
    let rule = GaussLegendre::new(order)?;

    let mean: f64 = weights.iter().zip(responses).map(|(w, f)| w * f).sum();
    let variance: f64 = weights
        .iter()
        .zip(responses)
        .map(|(w, f)| w * (f - mean).powi(2))
        .sum();
    if variance <= 0.0 {
        return Err(UqError::insufficient(
            "response variance is zero; indices are undefined",
        ));
    }

    let mut indices = Vec::with_capacity(dims);
    for (variable, name) in plan.names().iter().enumerate() {
        let stride = order.pow((dims - 1 - variable) as u32);

        // Main effect: variance of E[f | x_i] over the nodes of x_i.
        let mut conditional = vec![0.0; order];
        for (row, (&w, &f)) in weights.iter().zip(responses).enumerate() {
            let k = (row / stride) % order;
            conditional[k] += w / rule.weights[k] * f;
        }
        let main: f64 = conditional
            .iter()
            .zip(&rule.weights)
            .map(|(e, w)| w * (e - mean).powi(2))
            .sum();

        // Total effect: expected variance along x_i with the others fixed.
        let mut residual = 0.0;
        for row in (0..nodes).filter(|row| (row / stride) % order == 0) {
            let others = weights[row] / rule.weights[0];
            let mut m1 = 0.0;
            let mut m2 = 0.0;
            for (k, w) in rule.weights.iter().enumerate() {
                let f = responses[row + k * stride];
                m1 += w * f;
                m2 += w * f * f;
            }
            residual += others * (m2 - m1 * m1);
        }

        indices.push(SobolIndex {
            variable: name.clone(),
            first_order: main / variance,
            total_effect: residual / variance,
        });
    }

    Ok(SensitivityReport {
        method: SensitivityMethod::Spectral,
        mean,
        variance,
        indices,
    })
}

/// Points per dimension of a full tensor grid with `nodes` nodes.
fn grid_order(nodes: usize, dims: usize) -> Result<usize, UqError> {
    let estimate = (nodes as f64).powf(1.0 / dims as f64).round() as usize;
    for order in estimate.saturating_sub(1)..=estimate + 1 {
        if order > 0 && order.checked_pow(dims as u32) == Some(nodes) {
            return Ok(order);
        }
    }
    Err(UqError::config(format!(
        "{nodes} nodes do not form a full tensor grid in {dims} dimensions"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::{generate, DesignMethod, ExperimentDesign};
    use crate::plan::plan;
    use crate::variables::UncertainVariable;
    use approx::assert_relative_eq;

    fn unit_square(method: DesignMethod) -> ExperimentDesign {
        ExperimentDesign::new(
            vec![
                UncertainVariable::uniform("x1", 0.0, 1.0).unwrap(),
                UncertainVariable::uniform("x2", 0.0, 1.0).unwrap(),
            ],
            Vec::new(),
            method,
            1234,
        )
        .unwrap()
        .with_variance_decomposition(true)
        .unwrap()
    }

    fn evaluate(plan: &ExecutionPlan, f: impl Fn(&[f64]) -> f64) -> Vec<f64> {
        plan.runs().iter().map(|run| f(&run.values)).collect()
    }

    #[test]
    fn sampling_indices_recover_additive_shares() {
        let design = unit_square(DesignMethod::LatinHypercube { samples: 8000 });
        let plan = plan(&design, &generate(&design)).unwrap();
        let y = evaluate(&plan, |x| x[0] + 2.0 * x[1]);

        let report = sobol_indices(&plan, &y).unwrap();
        assert_eq!(report.method, SensitivityMethod::Sampling);
        let x1 = report.index("x1").unwrap();
        let x2 = report.index("x2").unwrap();
        assert_relative_eq!(x1.first_order, 0.2, epsilon = 0.05);
        assert_relative_eq!(x2.first_order, 0.8, epsilon = 0.05);
        assert_relative_eq!(x1.total_effect, 0.2, epsilon = 0.06);
        assert_relative_eq!(x2.total_effect, 0.8, epsilon = 0.06);
    }

    #[test]
    fn spectral_indices_are_exact_for_low_degree_models() {
        let design = unit_square(DesignMethod::Quadrature { order: 3 });
        let plan = plan(&design, &generate(&design)).unwrap();

        let additive = sobol_indices(&plan, &evaluate(&plan, |x| x[0] + 2.0 * x[1])).unwrap();
        assert_eq!(additive.method, SensitivityMethod::Spectral);
        assert_relative_eq!(additive.variance, 5.0 / 12.0, epsilon = 1e-12);
        assert_relative_eq!(additive.indices[0].first_order, 0.2, epsilon = 1e-12);
        assert_relative_eq!(additive.indices[1].total_effect, 0.8, epsilon = 1e-12);

        let product = sobol_indices(&plan, &evaluate(&plan, |x| x[0] * x[1])).unwrap();
        assert_relative_eq!(product.mean, 0.25, epsilon = 1e-12);
        assert_relative_eq!(product.indices[0].first_order, 3.0 / 7.0, epsilon = 1e-12);
        assert_relative_eq!(product.indices[0].total_effect, 4.0 / 7.0, epsilon = 1e-12);
    }

    #[test]
    fn constant_response_has_no_indices() {
        let design = unit_square(DesignMethod::MonteCarlo { samples: 10 });
        let plan = plan(&design, &generate(&design)).unwrap();
        let err = sobol_indices(&plan, &vec![3.0; plan.len()]).unwrap_err();
        assert!(matches!(err, UqError::InsufficientData(_)));
    }

    #[test]
    fn response_length_must_match_plan() {
        let design = unit_square(DesignMethod::MonteCarlo { samples: 10 });
        let plan = plan(&design, &generate(&design)).unwrap();
        assert!(matches!(
            sobol_indices(&plan, &[1.0, 2.0]),
            Err(UqError::Expansion { expected: 40, got: 2, .. })
        ));
    }

    #[test]
    fn plain_sampling_plan_is_rejected() {
        let design = ExperimentDesign::new(
            vec![UncertainVariable::uniform("x1", 0.0, 1.0).unwrap()],
            Vec::new(),
            DesignMethod::MonteCarlo { samples: 5 },
            0,
        )
        .unwrap();
        let plan = plan(&design, &generate(&design)).unwrap();
        assert!(matches!(
            sobol_indices(&plan, &[1.0, 2.0, 3.0, 4.0, 5.0]),
            Err(UqError::Configuration(_))
        ));
    }

    #[test]
    fn grid_order_inverts_node_count() {
        assert_eq!(grid_order(64, 3).unwrap(), 4);
        assert_eq!(grid_order(7, 1).unwrap(), 7);
        assert!(grid_order(10, 2).is_err());
    }
}
