use splatpack_serde::TensorData;

/// Convert `[N, 3]` or `[N, 4]` colors to RGBA8.
///
/// The range is decided once for the whole batch: if no value exceeds 1.0
/// the colors are taken as unit range and scaled by 255. Values are then
/// truncated into `0..=255`. RGB input gets an opaque alpha.
pub fn normalize_colors(color: &TensorData) -> Vec<[u8; 4]> {
    let _span = tracing::trace_span!("NormalizeColors").entered();

    let unit_range = color.max().is_none_or(|max| max <= 1.0);
    let factor = if unit_range { 255.0 } else { 1.0 };

    color
        .iter_rows()
        .map(|rgb| {
            // `as u8` saturates and truncates toward zero.
            let channel = |c: usize| rgb.get(c).map_or(u8::MAX, |v| (v * factor) as u8);
            [channel(0), channel(1), channel(2), channel(3)]
        })
        .collect()
}
