use glam::{Mat4, Quat, Vec3, Vec4};
use splatpack_serde::TensorData;
use splatpack_serde::writer::encode_records;

use crate::ConvertError;

/// Floats per packed bone transform.
pub const MATRIX_FLOATS: usize = 16;

/// Build the homogeneous transform of one bone and flatten it column-major,
/// which is the order the renderer reads matrices in.
///
/// The quaternion is normalized first; a zero quaternion packs as no rotation.
pub fn pack_transform(rotation: Quat, translation: Vec3) -> [f32; MATRIX_FLOATS] {
    let rotation = Quat::from_vec4(Vec4::from(rotation).try_normalize().unwrap_or(Vec4::W));
    Mat4::from_rotation_translation(rotation, translation).to_cols_array()
}

/// Packed per-frame per-bone matrices, frame major.
#[derive(Debug, Clone, PartialEq)]
pub struct PackedAnimation {
    /// `[frames, bones, 16]`
    pub shape: Vec<usize>,
    pub values: Vec<f32>,
}

impl PackedAnimation {
    pub fn num_frames(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    /// Take an already packed `[F, Bn, 16]` pose array as is.
    pub fn from_packed(poses: &TensorData) -> Self {
        Self {
            shape: poses.shape.clone(),
            values: poses.to_f32_vec(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        encode_records(&self.values)
    }
}

/// Pack `[F, Bn, 4]` quaternions and `[F, Bn, 3]` translations into
/// `[F, Bn, 16]` column-major transforms.
pub fn pack_animation(
    rotations: &TensorData,
    translations: &TensorData,
) -> Result<PackedAnimation, ConvertError> {
    let _span = tracing::trace_span!("PackAnimation").entered();

    let [frames, bones, 4] = rotations.shape[..] else {
        return Err(ConvertError::Shape {
            name: "pose rotations",
            shape: rotations.shape.clone(),
            expected: "F×Bn×4".to_owned(),
        });
    };
    if translations.shape != [frames, bones, 3] {
        return Err(ConvertError::Shape {
            name: "pose translations",
            shape: translations.shape.clone(),
            expected: format!("{frames}×{bones}×3"),
        });
    }

    let values = rotations
        .data
        .chunks_exact(4)
        .zip(translations.data.chunks_exact(3))
        .flat_map(|(q, t)| {
            let q = Quat::from_xyzw(q[0] as f32, q[1] as f32, q[2] as f32, q[3] as f32);
            let t = Vec3::new(t[0] as f32, t[1] as f32, t[2] as f32);
            pack_transform(q, t)
        })
        .collect();

    Ok(PackedAnimation {
        shape: vec![frames, bones, MATRIX_FLOATS],
        values,
    })
}
