use splatpack_serde::TensorData;

pub const DEFAULT_OPACITY_THRESHOLD: f32 = 0.1;

/// Indices of the records whose opacity reaches `threshold`, in input order.
///
/// The comparison runs in f32 so a stored `0.1f32` passes a `0.1` threshold.
/// NaN opacities never pass.
pub fn opacity_mask(opacity: &TensorData, threshold: f32) -> Vec<usize> {
    opacity
        .data
        .iter()
        .enumerate()
        .filter(|&(_, &o)| o as f32 >= threshold)
        .map(|(i, _)| i)
        .collect()
}
