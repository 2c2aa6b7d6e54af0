//! Pixel-to-ground homography.
//!
//! The solver estimates `H` such that `w ~ H p`, where `p` is a pixel in
//! homogeneous form `(x, y, 1)` and `w` is the ground-plane point in meters.
//! Estimation uses the Hartley-normalized Direct Linear Transform: with exactly
//! four correspondences the solution is exact, with more it is the algebraic
//! least-squares fit.
//!
//! Degenerate inputs (duplicated or collinear pixels, rank-deficient systems,
//! ill-conditioned results) are rejected instead of returning a matrix that
//! would silently produce garbage distances.

use nalgebra::{DMatrix, Matrix3, Vector3};

use crate::calibration::{Correspondence, MIN_CORRESPONDENCES};
use crate::{MeasureError, PixelPoint, WorldPoint};

/// Homogeneous components smaller than this map to infinity.
pub const PROJECTION_EPSILON: f64 = 1e-9;

/// Upper bound on the condition number of the normalized homography.
pub const DEFAULT_MAX_CONDITION_NUMBER: f64 = 1e10;

/// Relative size below which a singular value counts as zero.
const RANK_TOLERANCE: f64 = 1e-9;

/// Minimum triangle area, in normalized units, for three points to count as non-collinear.
const COLLINEAR_TOLERANCE: f64 = 1e-6;

/// Normalized distance below which two pixel points count as duplicates.
const DUPLICATE_TOLERANCE: f64 = 1e-9;

// -------------------- HomographyMatrix --------------------

/// Non-singular 3x3 projective transform from image pixels to ground meters.
///
/// Only the solver (or [`HomographyMatrix::from_rows`], which re-checks
/// non-singularity) can build one, so every instance in circulation is valid.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HomographyMatrix {
    h: Matrix3<f64>,
}

impl HomographyMatrix {
    /// Build from row-major entries. Fails when the matrix is singular or non-finite.
    pub fn from_rows(rows: [[f64; 3]; 3]) -> Result<Self, MeasureError> {
        let h = Matrix3::from_fn(|r, c| rows[r][c]);
        if h.iter().any(|v| !v.is_finite()) {
            return Err(MeasureError::degenerate("matrix has non-finite entries"));
        }
        let det = h.determinant();
        if det.abs() <= f64::EPSILON * h.norm().powi(3) {
            return Err(MeasureError::degenerate(format!(
                "matrix is singular (det={det:e})"
            )));
        }
        Ok(Self { h })
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.h
    }

    /// Row-major copy of the entries.
    pub fn rows(&self) -> [[f64; 3]; 3] {
        let mut out = [[0.0; 3]; 3];
        for (r, row) in out.iter_mut().enumerate() {
            for (c, v) in row.iter_mut().enumerate() {
                *v = self.h[(r, c)];
            }
        }
        out
    }

    pub fn determinant(&self) -> f64 {
        self.h.determinant()
    }

    /// Ratio of largest to smallest singular value.
    pub fn condition_number(&self) -> f64 {
        condition_number(&self.h)
    }

    /// Map a pixel onto the ground plane. See [`map_to_world`].
    pub fn map(&self, pixel: PixelPoint) -> Result<WorldPoint, MeasureError> {
        map_to_world(pixel, self)
    }

    /// Root-mean-square ground-plane error of mapping each pixel to its world point.
    pub fn reprojection_rmse(
        &self,
        correspondences: &[Correspondence],
    ) -> Result<f64, MeasureError> {
        if correspondences.is_empty() {
            return Ok(0.0);
        }
        let mut sum_sq = 0.0;
        for c in correspondences {
            let mapped = self.map(c.pixel())?;
            let err = mapped.distance_to(&c.world());
            sum_sq += err * err;
        }
        Ok((sum_sq / correspondences.len() as f64).sqrt())
    }
}

// -------------------- Coordinate Mapper --------------------

/// Map a pixel to ground coordinates: `(x, y, 1)` times `H`, then projective division.
///
/// Pure and deterministic. Fails with `DegenerateProjection` when the
/// homogeneous component vanishes (the pixel lies on the horizon line of the
/// ground plane) or the result is not finite.
pub fn map_to_world(pixel: PixelPoint, h: &HomographyMatrix) -> Result<WorldPoint, MeasureError> {
    if !pixel.is_finite() {
        return Err(MeasureError::invalid(format!(
            "pixel ({}, {}) is not finite",
            pixel.x, pixel.y
        )));
    }
    let v = h.h * Vector3::new(pixel.x, pixel.y, 1.0);
    let w = v[2];
    if !w.is_finite() || w.abs() <= PROJECTION_EPSILON {
        return Err(MeasureError::DegenerateProjection {
            x: pixel.x,
            y: pixel.y,
        });
    }
    let world = WorldPoint::new(v[0] / w, v[1] / w);
    if !world.is_finite() {
        return Err(MeasureError::DegenerateProjection {
            x: pixel.x,
            y: pixel.y,
        });
    }
    Ok(world)
}

// -------------------- Solver --------------------

/// Normalized DLT solver with degeneracy checks.
#[derive(Clone, Copy, Debug)]
pub struct HomographySolver {
    max_condition_number: f64,
}

impl Default for HomographySolver {
    fn default() -> Self {
        Self {
            max_condition_number: DEFAULT_MAX_CONDITION_NUMBER,
        }
    }
}

impl HomographySolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the condition-number ceiling used to reject ill-conditioned fits.
    pub fn with_max_condition_number(mut self, max_condition_number: f64) -> Self {
        self.max_condition_number = max_condition_number;
        self
    }

    pub fn max_condition_number(&self) -> f64 {
        self.max_condition_number
    }

    /// Estimate the pixel-to-ground homography from at least four correspondences.
    pub fn solve(
        &self,
        correspondences: &[Correspondence],
    ) -> Result<HomographyMatrix, MeasureError> {
        let n = correspondences.len();
        if n < MIN_CORRESPONDENCES {
            return Err(MeasureError::InsufficientPoints {
                required: MIN_CORRESPONDENCES,
                found: n,
            });
        }

        let pixels: Vec<(f64, f64)> = correspondences
            .iter()
            .map(|c| (c.pixel().x, c.pixel().y))
            .collect();
        let worlds: Vec<(f64, f64)> = correspondences
            .iter()
            .map(|c| (c.world().x, c.world().y))
            .collect();

        let (pixels_n, t_pixel) = normalize_points(&pixels)
            .ok_or_else(|| MeasureError::degenerate("all pixel points coincide"))?;
        let (worlds_n, t_world) = normalize_points(&worlds)
            .ok_or_else(|| MeasureError::degenerate("all world points coincide"))?;

        check_pixel_configuration(&pixels_n)?;

        let mut a = DMatrix::<f64>::zeros(2 * n, 9);
        for (i, (&(x, y), &(u, v))) in pixels_n.iter().zip(worlds_n.iter()).enumerate() {
            let r0 = 2 * i;
            let r1 = 2 * i + 1;

            a[(r0, 0)] = -x;
            a[(r0, 1)] = -y;
            a[(r0, 2)] = -1.0;
            a[(r0, 6)] = u * x;
            a[(r0, 7)] = u * y;
            a[(r0, 8)] = u;

            a[(r1, 3)] = -x;
            a[(r1, 4)] = -y;
            a[(r1, 5)] = -1.0;
            a[(r1, 6)] = v * x;
            a[(r1, 7)] = v * y;
            a[(r1, 8)] = v;
        }

        // Exactly four points give an 8x9 system; pad so the SVD exposes the full null space.
        if a.nrows() < a.ncols() {
            let rows = a.nrows();
            let cols = a.ncols();
            let mut padded = DMatrix::<f64>::zeros(cols, cols);
            padded.view_mut((0, 0), (rows, cols)).copy_from(&a);
            a = padded;
        }

        let svd = a.svd(true, true);
        let sv = &svd.singular_values;
        let largest = sv[0];
        let second_smallest = sv[sv.len() - 2];
        if largest <= f64::EPSILON || second_smallest <= RANK_TOLERANCE * largest {
            return Err(MeasureError::degenerate(
                "correspondences do not determine a unique homography",
            ));
        }

        let v_t = svd
            .v_t
            .ok_or_else(|| MeasureError::degenerate("singular value decomposition failed"))?;
        let h_vec = v_t.row(v_t.nrows() - 1);
        let h_norm = Matrix3::from_fn(|r, c| h_vec[3 * r + c]);

        let cond = condition_number(&h_norm);
        if !cond.is_finite() || cond > self.max_condition_number {
            return Err(MeasureError::degenerate(format!(
                "homography is ill-conditioned (condition number {cond:e})"
            )));
        }

        let t_world_inv = t_world
            .try_inverse()
            .ok_or_else(|| MeasureError::degenerate("world normalization is not invertible"))?;
        let mut h = t_world_inv * h_norm * t_pixel;

        let scale = h[(2, 2)];
        if scale.abs() > f64::EPSILON {
            h /= scale;
        }

        let rows = HomographyMatrix { h }.rows();
        HomographyMatrix::from_rows(rows)
    }
}

/// Solve with default tolerances.
pub fn solve(correspondences: &[Correspondence]) -> Result<HomographyMatrix, MeasureError> {
    HomographySolver::default().solve(correspondences)
}

/// Hartley normalization: zero centroid, mean distance sqrt(2).
fn normalize_points(points: &[(f64, f64)]) -> Option<(Vec<(f64, f64)>, Matrix3<f64>)> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(ax, ay), &(x, y)| (ax + x, ay + y));
    let (cx, cy) = (sx / n, sy / n);

    let mean_dist = points
        .iter()
        .map(|&(x, y)| (x - cx).hypot(y - cy))
        .sum::<f64>()
        / n;
    if mean_dist <= f64::EPSILON {
        return None;
    }

    let scale = std::f64::consts::SQRT_2 / mean_dist;
    let t = Matrix3::new(
        scale,
        0.0,
        -scale * cx,
        0.0,
        scale,
        -scale * cy,
        0.0,
        0.0,
        1.0,
    );
    let normalized = points
        .iter()
        .map(|&(x, y)| (scale * (x - cx), scale * (y - cy)))
        .collect();
    Some((normalized, t))
}

/// Reject duplicated pixels, and collinear triples in a minimal four-point set.
fn check_pixel_configuration(points: &[(f64, f64)]) -> Result<(), MeasureError> {
    for i in 0..points.len() {
        for j in (i + 1)..points.len() {
            let (a, b) = (points[i], points[j]);
            if (a.0 - b.0).hypot(a.1 - b.1) <= DUPLICATE_TOLERANCE {
                return Err(MeasureError::degenerate(format!(
                    "pixel points {i} and {j} are duplicates"
                )));
            }
        }
    }

    if points.len() == MIN_CORRESPONDENCES {
        for skip in 0..points.len() {
            let triple: Vec<(f64, f64)> = points
                .iter()
                .enumerate()
                .filter(|(idx, _)| *idx != skip)
                .map(|(_, p)| *p)
                .collect();
            if triangle_area(triple[0], triple[1], triple[2]) <= COLLINEAR_TOLERANCE {
                return Err(MeasureError::degenerate(
                    "three of the four pixel points are collinear",
                ));
            }
        }
    } else {
        let anchor = points[0];
        let spans_plane = points.iter().enumerate().any(|(i, &p)| {
            points[i + 1..]
                .iter()
                .any(|&q| triangle_area(anchor, p, q) > COLLINEAR_TOLERANCE)
        });
        if !spans_plane {
            return Err(MeasureError::degenerate("all pixel points are collinear"));
        }
    }
    Ok(())
}

fn triangle_area(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> f64 {
    0.5 * ((b.0 - a.0) * (c.1 - a.1) - (b.1 - a.1) * (c.0 - a.0)).abs()
}

fn condition_number(m: &Matrix3<f64>) -> f64 {
    let sv = m.singular_values();
    let max = sv.max();
    let min = sv.min();
    if min <= 0.0 {
        f64::INFINITY
    } else {
        max / min
    }
}
