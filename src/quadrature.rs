//! Gauss-Legendre quadrature rules
//!
//! Nodes are the roots of the Legendre polynomial P_n, refined by Newton
//! iteration from the Tricomi initial guess. Rules are returned on the unit
//! interval with weights normalized to sum to one, which is the integration
//! measure of a uniform variable.

use crate::error::UqError;

/// Largest supported number of points per dimension.
pub const MAX_ORDER: usize = 64;

const NEWTON_TOL: f64 = 1e-15;
const NEWTON_MAX_ITER: usize = 100;

/// One-dimensional rule on `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussLegendre {
    pub nodes: Vec<f64>,
    pub weights: Vec<f64>,
}

impl GaussLegendre {
    pub fn new(order: usize) -> Result<Self, UqError> {
        if order == 0 || order > MAX_ORDER {
            return Err(UqError::config(format!(
                "quadrature order must be in 1..={MAX_ORDER}, got {order}"
            )));
        }
        Ok(Self::build(order))
    }

    /// Computes the rule without range checks. `order == 0` yields an empty
    /// rule.
    pub(crate) fn build(order: usize) -> Self {
        let mut nodes = vec![0.0; order];
        let mut weights = vec![0.0; order];
        let n = order as f64;

        // Roots are symmetric about zero; solve the upper half and mirror.
        for i in 0..(order + 1) / 2 {
            let mut x = (std::f64::consts::PI * (i as f64 + 0.75) / (n + 0.5)).cos();
            let mut derivative = 0.0;

            for _ in 0..NEWTON_MAX_ITER {
                let (p, dp) = legendre_with_derivative(order, x);
                derivative = dp;
                let step = p / dp;
                x -= step;
                if step.abs() < NEWTON_TOL {
                    break;
                }
            }

            let (_, dp) = legendre_with_derivative(order, x);
            if dp != 0.0 {
                derivative = dp;
            }
            let w = 2.0 / ((1.0 - x * x) * derivative * derivative);

            // Map [-1, 1] onto [0, 1]; the weight halves with the interval.
            nodes[i] = 0.5 * (1.0 - x);
            nodes[order - 1 - i] = 0.5 * (1.0 + x);
            weights[i] = 0.5 * w;
            weights[order - 1 - i] = 0.5 * w;
        }

        Self { nodes, weights }
    }

    pub fn order(&self) -> usize {
        self.nodes.len()
    }

    /// Applies the rule to `f` over `[0, 1]`.
    pub fn integrate(&self, f: impl Fn(f64) -> f64) -> f64 {
        self.nodes
            .iter()
            .zip(self.weights.iter())
            .map(|(&x, &w)| w * f(x))
            .sum()
    }
}

/// Evaluates P_n(x) and P_n'(x) with the three-term recurrence.
fn legendre_with_derivative(n: usize, x: f64) -> (f64, f64) {
    let mut p_prev = 1.0;
    let mut p = x;
    if n == 0 {
        return (1.0, 0.0);
    }

    for k in 2..=n {
        let k = k as f64;
        let p_next = ((2.0 * k - 1.0) * x * p - (k - 1.0) * p_prev) / k;
        p_prev = p;
        p = p_next;
    }

    let nf = n as f64;
    let dp = nf * (x * p - p_prev) / (x * x - 1.0);
    (p, dp)
}

/// Multi-index of the `row`-th node of a tensor grid with `order` points per
/// dimension. The last dimension varies fastest.
pub fn tensor_index(row: usize, order: usize, dims: usize) -> Vec<usize> {
    let mut index = vec![0; dims];
    let mut rest = row;
    for slot in index.iter_mut().rev() {
        *slot = rest % order;
        rest /= order;
    }
    index
}
