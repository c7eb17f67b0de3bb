//! Covariance → (scale, rotation) decomposition.
//!
//! A splat covariance is `R S² Rᵀ`. Its eigenvectors give `R` and the square
//! roots of its eigenvalues give `S`.
//!
//! Eigenpairs are ordered by ascending eigenvalue and the only sign fix is
//! flipping the first eigenvector when the basis is a reflection. With
//! repeated eigenvalues any rotation of the degenerate subspace is equally
//! valid, so a different eigensolver can produce a different (equally
//! correct) quaternion. Quaternions are returned with `w >= 0`.

use glam::{Mat3, Quat, Vec3};
use nalgebra::{Matrix3, SymmetricEigen};
use splatpack_serde::TensorData;

/// Eigenvalue floor before the square root.
pub const MIN_EIGENVALUE: f64 = 1e-8;

/// What a record falls back to when its covariance can't be decomposed.
pub const FALLBACK_SCALE: Vec3 = Vec3::ONE;

/// Decompose a row-major 3×3 covariance. Only the lower triangle is read.
///
/// Returns `None` when the eigensolver does not converge, or when the input
/// or the resulting `f32` scale and rotation are not finite.
pub fn decompose_covariance(cov: &[f64]) -> Option<(Vec3, Quat)> {
    if cov.len() != 9 || !cov.iter().all(|v| v.is_finite()) {
        return None;
    }
    let eigen = SymmetricEigen::try_new(Matrix3::from_row_slice(cov), f64::EPSILON, 0)?;

    let mut order = [0, 1, 2];
    order.sort_by(|&a, &b| eigen.eigenvalues[a].total_cmp(&eigen.eigenvalues[b]));

    let scale = order.map(|i| eigen.eigenvalues[i].max(MIN_EIGENVALUE).sqrt() as f32);
    let mut cols = order.map(|i| {
        let v = eigen.eigenvectors.column(i);
        [v[0], v[1], v[2]]
    });

    if determinant(&cols) < 0.0 {
        cols[0] = cols[0].map(|v| -v);
    }

    let basis: [f32; 9] = std::array::from_fn(|i| cols[i / 3][i % 3] as f32);
    let scale = Vec3::from_array(scale);
    let mut rotation = Quat::from_mat3(&Mat3::from_cols_array(&basis));
    if rotation.w < 0.0 {
        rotation = -rotation;
    }

    // Huge but finite covariances overflow once narrowed to f32.
    (scale.is_finite() && rotation.is_finite()).then_some((scale, rotation))
}

fn determinant(cols: &[[f64; 3]; 3]) -> f64 {
    let [a, b, c] = cols;
    a[0] * (b[1] * c[2] - b[2] * c[1]) - b[0] * (a[1] * c[2] - a[2] * c[1])
        + c[0] * (a[1] * b[2] - a[2] * b[1])
}

/// Decomposed scales and rotations for every record.
pub struct Decomposed {
    pub scales: Vec<Vec3>,
    pub rotations: Vec<Quat>,
    /// Records that fell back to unit scale and identity rotation.
    pub fallbacks: usize,
}

/// Decompose every `[3, 3]` record of `covariance`. A record that can't be
/// decomposed gets [`FALLBACK_SCALE`] and the identity rotation; the batch
/// carries on.
pub fn decompose_all(covariance: &TensorData) -> Decomposed {
    let _span = tracing::trace_span!("DecomposeCovariance").entered();

    let mut scales = Vec::with_capacity(covariance.rows());
    let mut rotations = Vec::with_capacity(covariance.rows());
    let mut fallbacks = 0;

    for (i, cov) in covariance.data.chunks_exact(9).enumerate() {
        let (scale, rotation) = decompose_covariance(cov).unwrap_or_else(|| {
            log::warn!("Covariance of splat {i} can't be decomposed, using defaults");
            fallbacks += 1;
            (FALLBACK_SCALE, Quat::IDENTITY)
        });
        scales.push(scale);
        rotations.push(rotation);
    }

    Decomposed {
        scales,
        rotations,
        fallbacks,
    }
}
