//! Execution plan builder
//!
//! Maps a sample matrix to the ordered runs handed to the model execution
//! collaborator. Variance-based sampling plans are laid out as the blocks
//! A, B, A_B(1) .. A_B(M), each N runs long.

use std::ops::Range;

use serde::Serialize;

use crate::design::{self, DesignKind, ExperimentDesign, SampleMatrix};
use crate::error::{ensure_len, UqError};

/// Which matrix of the plan a run belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "block", rename_all = "snake_case")]
pub enum RunBlock {
    /// Plain design row.
    Sample,
    /// Matrix A.
    Base,
    /// Matrix B.
    Resample,
    /// Matrix A with column `variable` taken from B.
    Substituted { variable: usize },
}

impl RunBlock {
    pub fn label(&self) -> String {
        match self {
            Self::Sample => "sample".to_string(),
            Self::Base => "base".to_string(),
            Self::Resample => "resample".to_string(),
            Self::Substituted { variable } => format!("substituted_{}", variable + 1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSpec {
    /// 1-based, equal to the `eval_id` the engine writes for this run.
    pub run_id: usize,
    pub block: RunBlock,
    pub values: Vec<f64>,
}

/// Ordered runs of one experiment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionPlan {
    names: Vec<String>,
    runs: Vec<RunSpec>,
    base_samples: usize,
    decomposed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    weights: Option<Vec<f64>>,
    kind: DesignKind,
}

impl ExecutionPlan {
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn runs(&self) -> &[RunSpec] {
        &self.runs
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.names.len()
    }

    /// N: rows of the sample matrix the plan was built from.
    pub fn base_samples(&self) -> usize {
        self.base_samples
    }

    /// True for the A, B, A_B(i) layout.
    pub fn is_decomposed(&self) -> bool {
        self.decomposed
    }

    pub fn kind(&self) -> DesignKind {
        self.kind
    }

    /// Quadrature weights of the runs, for spectral designs.
    pub fn weights(&self) -> Option<&[f64]> {
        self.weights.as_deref()
    }

    pub fn run_ids(&self) -> impl Iterator<Item = usize> + '_ {
        self.runs.iter().map(|run| run.run_id)
    }

    /// Row range of `block` within the plan.
    pub fn block_range(&self, block: &RunBlock) -> Option<Range<usize>> {
        let n = self.base_samples;
        match (self.decomposed, block) {
            (false, RunBlock::Sample) => Some(0..self.runs.len()),
            (true, RunBlock::Base) => Some(0..n),
            (true, RunBlock::Resample) => Some(n..2 * n),
            (true, RunBlock::Substituted { variable }) if *variable < self.names.len() => {
                let start = (variable + 2) * n;
                Some(start..start + n)
            }
            _ => None,
        }
    }
}

/// Total runs of a variance-based sampling plan.
pub fn decomposition_run_count(samples: usize, dimension: usize) -> usize {
    samples * (dimension + 2)
}

/// Builds the execution plan of `design` over `matrix`.
pub fn plan(design: &ExperimentDesign, matrix: &SampleMatrix) -> Result<ExecutionPlan, UqError> {
    let names = design.variable_names();
    let matching = names
        .iter()
        .zip(matrix.names())
        .take_while(|(a, b)| a == b)
        .count();
    ensure_len("sample matrix variable", names.len(), matching)?;
    ensure_len("sample matrix variable", names.len(), matrix.names().len())?;
    ensure_len("sample matrix row", design.sample_count(), matrix.len())?;

    let kind = design.kind();
    if design.variance_decomposition() && kind.is_random() {
        let resample = design::generate_with_seed(design, design.resample_seed());
        return decomposition_plan(names, matrix, &resample, kind);
    }

    let runs = matrix
        .rows()
        .iter()
        .enumerate()
        .map(|(i, row)| RunSpec {
            run_id: i + 1,
            block: RunBlock::Sample,
            values: row.clone(),
        })
        .collect();

    Ok(ExecutionPlan {
        names,
        runs,
        base_samples: matrix.len(),
        decomposed: false,
        weights: matrix.weights().map(<[f64]>::to_vec),
        kind,
    })
}

fn decomposition_plan(
    names: Vec<String>,
    base: &SampleMatrix,
    resample: &SampleMatrix,
    kind: DesignKind,
) -> Result<ExecutionPlan, UqError> {
    let n = base.len();
    let dimension = names.len();
    ensure_len("resample matrix row", n, resample.len())?;

    let mut runs = Vec::with_capacity(decomposition_run_count(n, dimension));
    let mut push = |block: RunBlock, values: Vec<f64>| {
        let run_id = runs.len() + 1;
        runs.push(RunSpec {
            run_id,
            block,
            values,
        });
    };

    for row in base.rows() {
        push(RunBlock::Base, row.clone());
    }
    for row in resample.rows() {
        push(RunBlock::Resample, row.clone());
    }
    for variable in 0..dimension {
        for (a, b) in base.rows().iter().zip(resample.rows()) {
            let mut values = a.clone();
            values[variable] = b[variable];
            push(RunBlock::Substituted { variable }, values);
        }
    }

    ensure_len(
        "variance-based plan",
        decomposition_run_count(n, dimension),
        runs.len(),
    )?;

    Ok(ExecutionPlan {
        names,
        runs,
        base_samples: n,
        decomposed: true,
        weights: None,
        kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::{generate, DesignMethod};
    use crate::variables::UncertainVariable;
    use proptest::prelude::*;

    fn variables(count: usize) -> Vec<UncertainVariable> {
        (0..count)
            .map(|i| UncertainVariable::uniform(format!("x{}", i + 1), 0.0, 1.0 + i as f64).unwrap())
            .collect()
    }

    fn lhs(samples: usize, dims: usize, decompose: bool) -> ExperimentDesign {
        ExperimentDesign::new(
            variables(dims),
            Vec::new(),
            DesignMethod::LatinHypercube { samples },
            11,
        )
        .unwrap()
        .with_variance_decomposition(decompose)
        .unwrap()
    }

    #[test]
    fn plain_plan_has_one_run_per_row() {
        let design = lhs(8, 2, false);
        let matrix = generate(&design);
        let plan = plan(&design, &matrix).unwrap();

        assert_eq!(plan.len(), 8);
        assert!(!plan.is_decomposed());
        assert_eq!(plan.run_ids().collect::<Vec<_>>(), (1..=8).collect::<Vec<_>>());
        assert_eq!(plan.runs()[3].values, matrix.rows()[3]);
    }

    #[test]
    fn substituted_blocks_take_one_column_from_resample() {
        let design = lhs(5, 3, true);
        let matrix = generate(&design);
        let plan = plan(&design, &matrix).unwrap();
        let resample = plan.block_range(&RunBlock::Resample).unwrap();

        for variable in 0..3 {
            let range = plan.block_range(&RunBlock::Substituted { variable }).unwrap();
            for (k, row) in range.enumerate() {
                let run = &plan.runs()[row];
                assert_eq!(run.block, RunBlock::Substituted { variable });
                for j in 0..3 {
                    let expected = if j == variable {
                        plan.runs()[resample.start + k].values[j]
                    } else {
                        matrix.rows()[k][j]
                    };
                    assert_eq!(run.values[j], expected);
                }
            }
        }
    }

    #[test]
    fn resample_differs_from_base() {
        let design = lhs(6, 2, true);
        let plan = plan(&design, &generate(&design)).unwrap();
        let base = plan.block_range(&RunBlock::Base).unwrap();
        let resample = plan.block_range(&RunBlock::Resample).unwrap();
        assert_ne!(
            plan.runs()[base.start].values,
            plan.runs()[resample.start].values
        );
    }

    #[test]
    fn quadrature_decomposition_stays_on_nodes() {
        let design = ExperimentDesign::new(
            variables(2),
            Vec::new(),
            DesignMethod::Quadrature { order: 3 },
            0,
        )
        .unwrap()
        .with_variance_decomposition(true)
        .unwrap();
        let plan = plan(&design, &generate(&design)).unwrap();
        assert_eq!(plan.len(), 9);
        assert!(!plan.is_decomposed());
        assert_eq!(plan.weights().map(<[f64]>::len), Some(9));
    }

    #[test]
    fn mismatched_matrix_is_rejected() {
        let design = lhs(8, 2, false);
        let other = lhs(9, 2, false);
        let err = plan(&design, &generate(&other)).unwrap_err();
        assert!(matches!(err, UqError::Expansion { expected: 8, got: 9, .. }));

        let renamed = ExperimentDesign::new(
            vec![
                UncertainVariable::uniform("a", 0.0, 1.0).unwrap(),
                UncertainVariable::uniform("b", 0.0, 1.0).unwrap(),
            ],
            Vec::new(),
            DesignMethod::LatinHypercube { samples: 8 },
            0,
        )
        .unwrap();
        assert!(matches!(
            plan(&design, &generate(&renamed)),
            Err(UqError::Expansion { .. })
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn decomposition_plan_has_n_times_m_plus_two_runs(samples in 1usize..40, dims in 1usize..6) {
            let design = lhs(samples, dims, true);
            let plan = plan(&design, &generate(&design)).unwrap();
            prop_assert_eq!(plan.len(), samples * (dims + 2));
            prop_assert!(plan.runs().iter().enumerate().all(|(i, run)| run.run_id == i + 1));
        }
    }
}
