use splatpack_serde::{TensorData, WeightRecord};

/// Bone influences kept per splat.
pub const MAX_INFLUENCES: usize = 4;

/// Keeps the renormalization finite for all-zero rows.
pub const WEIGHT_EPSILON: f64 = 1e-8;

/// Keep the [`MAX_INFLUENCES`] largest weights of one record and renormalize
/// them to sum to one.
///
/// Pairs come out ordered by weight, largest first. Non-finite weights count
/// as zero. Records over fewer bones are padded with bone 0 at weight 0.
pub fn reduce_weights(row: &[f64]) -> WeightRecord {
    let mut ranked: Vec<(usize, f64)> = row
        .iter()
        .map(|&w| if w.is_finite() { w } else { 0.0 })
        .enumerate()
        .collect();

    let by_weight = |a: &(usize, f64), b: &(usize, f64)| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0));
    if ranked.len() > MAX_INFLUENCES {
        ranked.select_nth_unstable_by(MAX_INFLUENCES - 1, by_weight);
        ranked.truncate(MAX_INFLUENCES);
    }
    ranked.sort_by(by_weight);

    let total: f64 = ranked.iter().map(|(_, w)| w).sum();
    let denom = total + WEIGHT_EPSILON;

    let mut record = WeightRecord::default();
    for (slot, (bone, weight)) in ranked.into_iter().enumerate() {
        record.bone_indices[slot] = bone as u16;
        record.bone_weights[slot] = (weight / denom) as f32;
    }
    record
}

/// Reduce an `[N, B]` weight matrix to one [`WeightRecord`] per row.
pub fn reduce_skin_weights(weights: &TensorData) -> Vec<WeightRecord> {
    let _span = tracing::trace_span!("ReduceSkinWeights").entered();
    weights.iter_rows().map(reduce_weights).collect()
}
