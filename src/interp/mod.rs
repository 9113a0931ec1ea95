//! Spatial interpolator
//!
//! Resamples scattered `(x, y, z)` observations onto a regular lattice over
//! two input axes. Lattice nodes outside the convex hull of the scatter carry
//! no value.

mod delaunay;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::UqError;
use crate::table::ResponseTable;
use delaunay::Triangulation;

pub const DEFAULT_GRID_SIZE: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterpolationMethod {
    /// Barycentric interpolation over the Delaunay triangles.
    #[default]
    Linear,
    /// Cubic Bezier triangles with estimated vertex gradients.
    Cubic,
}

impl fmt::Display for InterpolationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Linear => f.write_str("linear"),
            Self::Cubic => f.write_str("cubic"),
        }
    }
}

impl FromStr for InterpolationMethod {
    type Err = UqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(Self::Linear),
            "cubic" => Ok(Self::Cubic),
            other => Err(UqError::config(format!(
                "unknown interpolation method '{other}'"
            ))),
        }
    }
}

/// Lattice shape and optional declared axis ranges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub nx: usize,
    pub ny: usize,
    pub x_range: Option<(f64, f64)>,
    pub y_range: Option<(f64, f64)>,
}

impl Default for GridSpec {
    fn default() -> Self {
        Self {
            nx: DEFAULT_GRID_SIZE,
            ny: DEFAULT_GRID_SIZE,
            x_range: None,
            y_range: None,
        }
    }
}

impl GridSpec {
    pub fn validate(&self) -> Result<(), UqError> {
        if self.nx == 0 || self.ny == 0 {
            return Err(UqError::config(format!(
                "grid size {}x{} must be positive",
                self.nx, self.ny
            )));
        }
        for (axis, range) in [("x", self.x_range), ("y", self.y_range)] {
            if let Some((lo, hi)) = range {
                if !lo.is_finite() || !hi.is_finite() || lo >= hi {
                    return Err(UqError::config(format!(
                        "{axis} range ({lo}, {hi}) must be finite and increasing"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Affine map of the scatter's bounding box onto the unit square.
#[derive(Debug, Clone, Copy, PartialEq)]
struct UnitBox {
    origin: [f64; 2],
    scale: [f64; 2],
}

impl UnitBox {
    fn apply(&self, x: f64, y: f64) -> [f64; 2] {
        [
            (x - self.origin[0]) / self.scale[0],
            (y - self.origin[1]) / self.scale[1],
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Interpolant {
    mesh: Triangulation,
    values: Vec<f64>,
    /// Per-vertex gradients in unit-box coordinates, cubic only.
    gradients: Option<Vec<[f64; 2]>>,
    unit: UnitBox,
}

impl Interpolant {
    fn new(x: &[f64], y: &[f64], z: &[f64], method: InterpolationMethod) -> Result<Self, UqError> {
        if x.len() != y.len() || x.len() != z.len() {
            return Err(UqError::insufficient(format!(
                "scatter columns differ in length ({}, {}, {})",
                x.len(),
                y.len(),
                z.len()
            )));
        }
        if x.iter().chain(y).chain(z).any(|v| !v.is_finite()) {
            return Err(UqError::insufficient("scatter contains non-finite values"));
        }

        let (x_lo, x_hi) = min_max(x);
        let (y_lo, y_hi) = min_max(y);
        let unit = UnitBox {
            origin: [x_lo, y_lo],
            scale: [nonzero(x_hi - x_lo), nonzero(y_hi - y_lo)],
        };

        // Exact duplicate locations keep their first value.
        let mut points: Vec<[f64; 2]> = Vec::with_capacity(x.len());
        let mut values = Vec::with_capacity(x.len());
        for ((&xi, &yi), &zi) in x.iter().zip(y).zip(z) {
            let p = unit.apply(xi, yi);
            if !points.contains(&p) {
                points.push(p);
                values.push(zi);
            }
        }

        let mesh = Triangulation::new(points)?;
        let gradients = match method {
            InterpolationMethod::Linear => None,
            InterpolationMethod::Cubic => Some(vertex_gradients(&mesh, &values)),
        };

        Ok(Self {
            mesh,
            values,
            gradients,
            unit,
        })
    }

    fn eval(&self, x: f64, y: f64) -> Option<f64> {
        let q = self.unit.apply(x, y);
        let (index, w) = self.mesh.locate(q)?;
        let tri = self.mesh.triangles[index];
        let f = tri.map(|v| self.values[v]);

        match &self.gradients {
            None => Some(w[0] * f[0] + w[1] * f[1] + w[2] * f[2]),
            Some(gradients) => {
                let p = tri.map(|v| self.mesh.points[v]);
                let g = tri.map(|v| gradients[v]);
                Some(bezier_patch(p, f, g, w))
            }
        }
    }
}

fn nonzero(span: f64) -> f64 {
    if span > 0.0 {
        span
    } else {
        1.0
    }
}

fn min_max(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        })
}

/// Gradient of the plane through a triangle's three values.
fn plane_gradient(p: [[f64; 2]; 3], f: [f64; 3]) -> [f64; 2] {
    let det = delaunay::cross(p[0], p[1], p[2]);
    let e1 = [p[1][0] - p[0][0], p[1][1] - p[0][1]];
    let e2 = [p[2][0] - p[0][0], p[2][1] - p[0][1]];
    let d1 = f[1] - f[0];
    let d2 = f[2] - f[0];
    [
        (d1 * e2[1] - d2 * e1[1]) / det,
        (d2 * e1[0] - d1 * e2[0]) / det,
    ]
}

/// Area-weighted average of the plane gradients around each vertex.
fn vertex_gradients(mesh: &Triangulation, values: &[f64]) -> Vec<[f64; 2]> {
    let mut sum = vec![[0.0, 0.0]; mesh.points.len()];
    let mut weight = vec![0.0; mesh.points.len()];

    for tri in &mesh.triangles {
        let p = tri.map(|v| mesh.points[v]);
        let f = tri.map(|v| values[v]);
        let area = 0.5 * delaunay::cross(p[0], p[1], p[2]).abs();
        let g = plane_gradient(p, f);
        for &v in tri {
            sum[v][0] += area * g[0];
            sum[v][1] += area * g[1];
            weight[v] += area;
        }
    }

    sum.into_iter()
        .zip(weight)
        .map(|(s, w)| if w > 0.0 { [s[0] / w, s[1] / w] } else { [0.0, 0.0] })
        .collect()
}

/// Cubic Bezier triangle through the vertex values with the given vertex
/// gradients, evaluated at barycentric coordinates `w`.
fn bezier_patch(p: [[f64; 2]; 3], f: [f64; 3], g: [[f64; 2]; 3], w: [f64; 3]) -> f64 {
    let toward = |i: usize, j: usize| {
        let d = [p[j][0] - p[i][0], p[j][1] - p[i][1]];
        f[i] + (g[i][0] * d[0] + g[i][1] * d[1]) / 3.0
    };

    let b210 = toward(0, 1);
    let b201 = toward(0, 2);
    let b120 = toward(1, 0);
    let b021 = toward(1, 2);
    let b102 = toward(2, 0);
    let b012 = toward(2, 1);
    let edge_sum = b210 + b201 + b120 + b021 + b102 + b012;
    let vertex_sum = f[0] + f[1] + f[2];
    let b111 = edge_sum / 4.0 - vertex_sum / 6.0;

    let [u, v, t] = w;
    f[0] * u.powi(3)
        + f[1] * v.powi(3)
        + f[2] * t.powi(3)
        + 3.0 * (b210 * u * u * v + b201 * u * u * t + b120 * u * v * v)
        + 3.0 * (b021 * v * v * t + b102 * u * t * t + b012 * v * t * t)
        + 6.0 * b111 * u * v * t
}

/// Regular lattice of interpolated values plus the scatter it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterpolationGrid {
    pub method: InterpolationMethod,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    /// Row-major: `values[j * x.len() + i]` is the node at `(x[i], y[j])`.
    pub values: Vec<Option<f64>>,
    pub scatter: Vec<[f64; 3]>,
    #[serde(skip)]
    interpolant: Interpolant,
}

impl InterpolationGrid {
    pub fn nx(&self) -> usize {
        self.x.len()
    }

    pub fn ny(&self) -> usize {
        self.y.len()
    }

    pub fn value(&self, i: usize, j: usize) -> Option<f64> {
        if i >= self.nx() || j >= self.ny() {
            return None;
        }
        self.values[j * self.nx() + i]
    }

    /// Evaluates the interpolant at an arbitrary point.
    pub fn value_at(&self, x: f64, y: f64) -> Option<f64> {
        self.interpolant.eval(x, y)
    }

    pub fn defined_nodes(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }
}

pub fn interpolate(
    x: &[f64],
    y: &[f64],
    z: &[f64],
    spec: &GridSpec,
    method: InterpolationMethod,
) -> Result<InterpolationGrid, UqError> {
    spec.validate()?;
    let interpolant = Interpolant::new(x, y, z, method)?;

    let x_range = spec.x_range.unwrap_or_else(|| min_max(x));
    let y_range = spec.y_range.unwrap_or_else(|| min_max(y));
    let xs = linspace(x_range, spec.nx);
    let ys = linspace(y_range, spec.ny);

    let mut values = Vec::with_capacity(xs.len() * ys.len());
    for &yj in &ys {
        for &xi in &xs {
            values.push(interpolant.eval(xi, yj));
        }
    }

    let scatter = x
        .iter()
        .zip(y)
        .zip(z)
        .map(|((&a, &b), &c)| [a, b, c])
        .collect();

    Ok(InterpolationGrid {
        method,
        x: xs,
        y: ys,
        values,
        scatter,
        interpolant,
    })
}

/// Interpolates response column `z` over input columns `x` and `y`.
pub fn interpolate_table(
    table: &ResponseTable,
    x: &str,
    y: &str,
    z: &str,
    spec: &GridSpec,
    method: InterpolationMethod,
) -> Result<InterpolationGrid, UqError> {
    interpolate(
        table.column(x)?,
        table.column(y)?,
        table.column(z)?,
        spec,
        method,
    )
}

/// `count` evenly spaced points including both ends.
fn linspace((lo, hi): (f64, f64), count: usize) -> Vec<f64> {
    if count == 1 {
        return vec![lo];
    }
    let mut points: Vec<f64> = (0..count)
        .map(|k| lo + (hi - lo) * k as f64 / (count - 1) as f64)
        .collect();
    points[count - 1] = hi;
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ingest;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    const X: [f64; 3] = [0.0, 1.0, 0.0];
    const Y: [f64; 3] = [0.0, 0.0, 1.0];
    const Z: [f64; 3] = [1.0, 2.0, 3.0];

    #[test]
    fn linear_reproduces_data_and_leaves_outside_empty() {
        let grid =
            interpolate(&X, &Y, &Z, &GridSpec::default(), InterpolationMethod::Linear).unwrap();
        for k in 0..3 {
            assert_relative_eq!(grid.value_at(X[k], Y[k]).unwrap(), Z[k], epsilon = 1e-12);
        }
        assert_relative_eq!(grid.value_at(0.25, 0.25).unwrap(), 1.75, epsilon = 1e-12);
        assert_eq!(grid.value_at(0.8, 0.8), None);
        assert_eq!(grid.value_at(-0.1, 0.5), None);
    }

    #[test]
    fn lattice_is_row_major_over_declared_range() {
        let spec = GridSpec {
            nx: 5,
            ny: 3,
            x_range: Some((0.0, 1.0)),
            y_range: Some((0.0, 1.0)),
        };
        let grid = interpolate(&X, &Y, &Z, &spec, InterpolationMethod::Linear).unwrap();
        assert_eq!(grid.values.len(), 15);
        assert_eq!(grid.x, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert_eq!(grid.y, vec![0.0, 0.5, 1.0]);
        assert_relative_eq!(grid.value(0, 0).unwrap(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(grid.value(0, 2).unwrap(), 3.0, epsilon = 1e-12);
        assert_relative_eq!(grid.value(2, 1).unwrap(), 2.5, epsilon = 1e-12);
        assert_eq!(grid.value(4, 2), None);
        assert_eq!(grid.scatter.len(), 3);
    }

    #[test]
    fn cubic_is_exact_at_data_points() {
        let x: [f64; 5] = [0.0, 1.0, 0.0, 1.0, 0.4];
        let y: [f64; 5] = [0.0, 0.0, 1.0, 1.0, 0.6];
        let z: Vec<f64> = x.iter().zip(&y).map(|(a, b)| (a * 3.0).sin() + b * b).collect();
        let grid = interpolate(&x, &y, &z, &GridSpec::default(), InterpolationMethod::Cubic)
            .unwrap();
        for k in 0..x.len() {
            assert_relative_eq!(grid.value_at(x[k], y[k]).unwrap(), z[k], epsilon = 1e-10);
        }
    }

    #[test]
    fn degenerate_scatter_is_rejected() {
        let err = interpolate(
            &[0.0, 1.0, 2.0],
            &[0.0, 1.0, 2.0],
            &[1.0, 1.0, 1.0],
            &GridSpec::default(),
            InterpolationMethod::Linear,
        )
        .unwrap_err();
        assert!(matches!(err, UqError::InsufficientData(_)));

        assert!(matches!(
            interpolate(&X, &Y, &Z[..2], &GridSpec::default(), InterpolationMethod::Linear),
            Err(UqError::InsufficientData(_))
        ));

        let inverted = GridSpec {
            x_range: Some((1.0, 0.0)),
            ..GridSpec::default()
        };
        assert!(matches!(
            interpolate(&X, &Y, &Z, &inverted, InterpolationMethod::Linear),
            Err(UqError::Configuration(_))
        ));
    }

    #[test]
    fn duplicate_locations_are_merged() {
        let x: [f64; 4] = [0.0, 1.0, 0.0, 1.0];
        let y: [f64; 4] = [0.0, 0.0, 1.0, 0.0];
        let z = [1.0, 2.0, 3.0, 9.0];
        let grid = interpolate(&x, &y, &z, &GridSpec::default(), InterpolationMethod::Linear)
            .unwrap();
        assert_relative_eq!(grid.value_at(1.0, 0.0).unwrap(), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn interpolates_named_table_columns() {
        let raw = "\
%eval_id interface T P Qs
1 NO_ID 12.8 1.4 3.0
2 NO_ID 15.8 1.4 6.0
3 NO_ID 12.8 1.8 4.0
4 NO_ID 15.8 1.8 7.0
";
        let table = ingest(raw).unwrap();
        let spec = GridSpec {
            nx: 4,
            ny: 4,
            ..GridSpec::default()
        };
        let grid =
            interpolate_table(&table, "T", "P", "Qs", &spec, InterpolationMethod::Linear).unwrap();
        assert_eq!(grid.defined_nodes(), 16);
        assert_relative_eq!(grid.value_at(14.3, 1.6).unwrap(), 5.0, epsilon = 1e-9);
        assert!(interpolate_table(&table, "T", "P", "Cs", &spec, InterpolationMethod::Linear)
            .is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn both_methods_reproduce_planes(
            a in -5.0f64..5.0,
            b in -5.0f64..5.0,
            c in -5.0f64..5.0,
            seed in 0u64..1000,
        ) {
            let n = 25;
            let offset = seed as f64 * 0.001;
            let x: Vec<f64> = (0..n).map(|k| (k as f64 * 0.618_034 + offset).fract() * 4.0 - 2.0).collect();
            let y: Vec<f64> = (0..n).map(|k| (k as f64 * 0.754_878 + 0.5 * offset).fract() * 2.0).collect();
            let z: Vec<f64> = x.iter().zip(&y).map(|(xi, yi)| a * xi + b * yi + c).collect();

            for method in [InterpolationMethod::Linear, InterpolationMethod::Cubic] {
                let grid = interpolate(&x, &y, &z, &GridSpec::default(), method).unwrap();
                prop_assert!(grid.defined_nodes() > 0);
                for (k, value) in grid.values.iter().enumerate() {
                    if let Some(v) = value {
                        let xi = grid.x[k % grid.nx()];
                        let yj = grid.y[k / grid.nx()];
                        prop_assert!((v - (a * xi + b * yj + c)).abs() < 1e-6);
                    }
                }
            }
        }
    }
}
