//! Conversion from the training convention (Y down, Z forward) to the
//! renderer convention (Y up, Z backward).
//!
//! Both are right handed and differ by a half turn around X, so points flip
//! the sign of Y and Z and quaternions flip the Y and Z of their vector part.
//! Applying a conversion twice gives back the input exactly.

use glam::{Quat, Vec3};
use splatpack_serde::TensorData;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoordError {
    #[error("Cannot convert array of shape {shape:?}, last axis must have {expected} components")]
    LastAxis { shape: Vec<usize>, expected: usize },
}

pub fn convert_point(p: Vec3) -> Vec3 {
    Vec3::new(p.x, -p.y, -p.z)
}

/// Quaternions are x y z w, `w` is untouched.
pub fn convert_quat(q: Quat) -> Quat {
    Quat::from_xyzw(q.x, -q.y, -q.z, q.w)
}

fn flip_yz(array: &TensorData, width: usize) -> Result<TensorData, CoordError> {
    if array.last_dim() != Some(width) {
        return Err(CoordError::LastAxis {
            shape: array.shape.clone(),
            expected: width,
        });
    }
    let mut out = array.clone();
    for chunk in out.data.chunks_exact_mut(width) {
        chunk[1] = -chunk[1];
        chunk[2] = -chunk[2];
    }
    Ok(out)
}

/// Convert an array of 3-vectors of any rank (`[3]`, `[N, 3]`, `[F, B, 3]`, …).
pub fn convert_points(array: &TensorData) -> Result<TensorData, CoordError> {
    flip_yz(array, 3)
}

/// Convert an array of quaternions of any rank (`[4]`, `[N, 4]`, `[F, B, 4]`, …).
pub fn convert_quats(array: &TensorData) -> Result<TensorData, CoordError> {
    flip_yz(array, 4)
}
