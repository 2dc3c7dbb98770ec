use nalgebra::{DMatrix, DVector, SymmetricEigen};
use serde::Serialize;
use std::f64::consts::TAU;

use crate::angle;

/// Confidence hyper-ellipsoid of a 1D, 2D or 3D dispersion block.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConfidenceRegion {
    /// Semi-axes in descending order.
    pub axes: Vec<f64>,
    /// Euler angles `[rx, ry, rz]` of `Rx·Ry·Rz` mapping the principal frame
    /// to the coordinate frame. Zero in 1D; only `rz` in 2D.
    pub angles: [f64; 3],
    /// Semi-axes of the horizontal (x/y) confidence ellipse.
    pub helmert_axes: [f64; 2],
    /// Bearing of the major Helmert axis in `[0, 2π)`.
    pub helmert_angle: f64,
}

/// Eigenvalues (clamped to zero, descending) and matching eigenvectors.
fn sorted_eigen(dispersion: &DMatrix<f64>) -> (Vec<f64>, DMatrix<f64>) {
    let eigen = SymmetricEigen::new(dispersion.clone());
    let n = dispersion.nrows();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));

    let values = order.iter().map(|&i| eigen.eigenvalues[i].max(0.0)).collect();
    let mut vectors = DMatrix::zeros(n, n);
    for (col, &i) in order.iter().enumerate() {
        vectors.set_column(col, &eigen.eigenvectors.column(i));
    }
    (values, vectors)
}

fn euler_angles(mut rotation: DMatrix<f64>) -> [f64; 3] {
    match rotation.nrows() {
        2 => {
            if rotation.determinant() < 0.0 {
                rotation.column_mut(0).neg_mut();
            }
            [0.0, 0.0, angle::normalize((-rotation[(0, 1)]).atan2(rotation[(0, 0)]))]
        }
        3 => {
            if rotation.determinant() < 0.0 {
                rotation.column_mut(0).neg_mut();
            }
            let (r11, r12, r13) = (rotation[(0, 0)], rotation[(0, 1)], rotation[(0, 2)]);
            let (r23, r33) = (rotation[(1, 2)], rotation[(2, 2)]);
            [
                angle::normalize((-r23).atan2(r33)),
                angle::normalize(r13.atan2(r23.hypot(r33))),
                angle::normalize((-r12).atan2(r11)),
            ]
        }
        _ => [0.0; 3],
    }
}

/// Helmert's point-error ellipse of the leading 2×2 block (unscaled).
pub fn helmert_ellipse(dispersion: &DMatrix<f64>) -> ([f64; 2], f64) {
    match dispersion.nrows() {
        0 => ([0.0; 2], 0.0),
        1 => ([dispersion[(0, 0)].max(0.0).sqrt(), 0.0], 0.0),
        _ => {
            let (qxx, qyy, qxy) = (dispersion[(0, 0)], dispersion[(1, 1)], dispersion[(0, 1)]);
            let w = ((qxx - qyy).powi(2) + 4.0 * qxy * qxy).sqrt();
            let a = (0.5 * (qxx + qyy + w)).max(0.0).sqrt();
            let b = (0.5 * (qxx + qyy - w)).max(0.0).sqrt();
            let theta = angle::modulo(0.5 * (2.0 * qxy).atan2(qxx - qyy), TAU);
            ([a, b], theta)
        }
    }
}

impl ConfidenceRegion {
    /// `quantile` is the F(dim, ∞) quantile of the test; pass 1 for the
    /// standard (1σ) region. `None` for an empty or over-sized block.
    pub fn new(dispersion: &DMatrix<f64>, quantile: f64) -> Option<Self> {
        let dim = dispersion.nrows();
        if dim == 0 || dim > 3 || dispersion.ncols() != dim {
            return None;
        }
        let scale = dim as f64 * quantile;
        let (values, vectors) = sorted_eigen(dispersion);
        let axes = values.iter().map(|v| (v * scale).sqrt()).collect();
        let angles = euler_angles(vectors);
        let ([a, b], helmert_angle) = helmert_ellipse(dispersion);
        let s = scale.sqrt();
        Some(Self {
            axes,
            angles,
            helmert_axes: [a * s, b * s],
            helmert_angle,
        })
    }
}

/// Minimal detectable bias vector along the principal axis:
/// `sqrt(λ · max eigenvalue) · e_max`.
pub fn mdb_vector(dispersion: &DMatrix<f64>, noncentrality: f64) -> Option<DVector<f64>> {
    if dispersion.nrows() == 0 {
        return None;
    }
    let (values, vectors) = sorted_eigen(dispersion);
    Some(vectors.column(0) * (noncentrality * values[0]).sqrt())
}
