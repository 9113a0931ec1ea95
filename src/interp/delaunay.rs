//! Bowyer-Watson Delaunay triangulation of distinct planar points.

use crate::error::UqError;

/// Barycentric tolerance for point location.
const LOCATE_TOL: f64 = 1e-10;

/// Relative area below which three points count as collinear.
const COLLINEAR_TOL: f64 = 1e-12;

const SUPER_SCALE: f64 = 100.0;

#[derive(Debug, Clone, Copy)]
struct Circle {
    center: [f64; 2],
    radius2: f64,
}

#[derive(Debug, Clone, Copy)]
struct Triangle {
    v: [usize; 3],
    circle: Circle,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Triangulation {
    pub points: Vec<[f64; 2]>,
    pub triangles: Vec<[usize; 3]>,
}

impl Triangulation {
    pub fn new(points: Vec<[f64; 2]>) -> Result<Self, UqError> {
        ensure_spread(&points)?;

        let (min, max) = bounds(&points);
        let span = (max[0] - min[0]).max(max[1] - min[1]);
        let mid = [0.5 * (min[0] + max[0]), 0.5 * (min[1] + max[1])];
        let n = points.len();

        let mut vertices = points.clone();
        vertices.push([mid[0] - SUPER_SCALE * span, mid[1] - span]);
        vertices.push([mid[0], mid[1] + SUPER_SCALE * span]);
        vertices.push([mid[0] + SUPER_SCALE * span, mid[1] - span]);

        let mut triangles = Vec::new();
        if let Some(t) = make_triangle(&vertices, [n, n + 1, n + 2]) {
            triangles.push(t);
        }

        for i in 0..n {
            let p = vertices[i];
            let (bad, good): (Vec<Triangle>, Vec<Triangle>) = triangles
                .into_iter()
                .partition(|t| dist2(p, t.circle.center) < t.circle.radius2);
            triangles = good;

            // Cavity boundary: edges of removed triangles not shared with
            // another removed triangle.
            let mut boundary: Vec<[usize; 2]> = Vec::new();
            for t in &bad {
                for edge in edges(t.v) {
                    let shared = bad
                        .iter()
                        .filter(|other| edges(other.v).iter().any(|e| same_edge(*e, edge)))
                        .count()
                        > 1;
                    if !shared {
                        boundary.push(edge);
                    }
                }
            }

            for [a, b] in boundary {
                if let Some(t) = make_triangle(&vertices, [a, b, i]) {
                    triangles.push(t);
                }
            }
        }

        let triangles: Vec<[usize; 3]> = triangles
            .into_iter()
            .map(|t| t.v)
            .filter(|v| v.iter().all(|&k| k < n))
            .collect();

        if triangles.is_empty() {
            return Err(UqError::insufficient(
                "points do not span a triangulable region",
            ));
        }

        Ok(Self { points, triangles })
    }

    /// Triangle containing `q` and the barycentric weights of its vertices.
    pub fn locate(&self, q: [f64; 2]) -> Option<(usize, [f64; 3])> {
        self.triangles.iter().enumerate().find_map(|(index, tri)| {
            let w = barycentric(
                self.points[tri[0]],
                self.points[tri[1]],
                self.points[tri[2]],
                q,
            )?;
            w.iter().all(|&c| c >= -LOCATE_TOL).then_some((index, w))
        })
    }
}

fn ensure_spread(points: &[[f64; 2]]) -> Result<(), UqError> {
    if points.len() < 3 {
        return Err(UqError::insufficient(format!(
            "interpolation needs at least three distinct points, got {}",
            points.len()
        )));
    }

    let (min, max) = bounds(points);
    let scale = (max[0] - min[0]).max(max[1] - min[1]);
    let p0 = points[0];
    let far = points
        .iter()
        .copied()
        .max_by(|a, b| dist2(*a, p0).total_cmp(&dist2(*b, p0)))
        .unwrap_or(p0);
    let spread = points
        .iter()
        .map(|&p| cross(p0, far, p).abs())
        .fold(0.0, f64::max);

    if scale == 0.0 || spread <= COLLINEAR_TOL * scale * scale {
        return Err(UqError::insufficient("interpolation points are collinear"));
    }
    Ok(())
}

fn bounds(points: &[[f64; 2]]) -> ([f64; 2], [f64; 2]) {
    points.iter().fold(
        ([f64::INFINITY; 2], [f64::NEG_INFINITY; 2]),
        |(lo, hi), p| {
            (
                [lo[0].min(p[0]), lo[1].min(p[1])],
                [hi[0].max(p[0]), hi[1].max(p[1])],
            )
        },
    )
}

fn edges(v: [usize; 3]) -> [[usize; 2]; 3] {
    [[v[0], v[1]], [v[1], v[2]], [v[2], v[0]]]
}

fn same_edge(a: [usize; 2], b: [usize; 2]) -> bool {
    (a[0] == b[0] && a[1] == b[1]) || (a[0] == b[1] && a[1] == b[0])
}

fn make_triangle(vertices: &[[f64; 2]], v: [usize; 3]) -> Option<Triangle> {
    let circle = circumcircle(vertices[v[0]], vertices[v[1]], vertices[v[2]])?;
    Some(Triangle { v, circle })
}

fn circumcircle(a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> Option<Circle> {
    let d = 2.0 * cross(a, b, c);
    if d == 0.0 {
        return None;
    }
    let bx = b[0] - a[0];
    let by = b[1] - a[1];
    let cx = c[0] - a[0];
    let cy = c[1] - a[1];
    let b2 = bx * bx + by * by;
    let c2 = cx * cx + cy * cy;
    let ux = (cy * b2 - by * c2) / d;
    let uy = (bx * c2 - cx * b2) / d;
    Some(Circle {
        center: [a[0] + ux, a[1] + uy],
        radius2: ux * ux + uy * uy,
    })
}

/// Twice the signed area of triangle `abc`.
pub(crate) fn cross(a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> f64 {
    (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0])
}

pub(crate) fn barycentric(a: [f64; 2], b: [f64; 2], c: [f64; 2], q: [f64; 2]) -> Option<[f64; 3]> {
    let area = cross(a, b, c);
    if area == 0.0 {
        return None;
    }
    let wa = cross(q, b, c) / area;
    let wb = cross(a, q, c) / area;
    Some([wa, wb, 1.0 - wa - wb])
}

fn dist2(a: [f64; 2], b: [f64; 2]) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)
}
