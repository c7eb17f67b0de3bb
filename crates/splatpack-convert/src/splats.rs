use glam::Vec3;
use splatpack_serde::header::{
    ANIMATION_FILE, JOINTS_FILE, PARENTS_FILE, SPLATS_FILE, WEIGHTS_FILE,
};
use splatpack_serde::writer::encode_records;
use splatpack_serde::{
    Bounds, Bundle, HeaderBuilder, PoseStream, SkeletonSource, SplatHeader, SplatRecord,
    SplatSource, TensorData, WeightRecord,
};

use crate::animation::{PackedAnimation, pack_animation};
use crate::color::normalize_colors;
use crate::config::ConvertConfig;
use crate::coords::{convert_point, convert_points, convert_quat, convert_quats};
use crate::covariance::decompose_all;
use crate::filter::opacity_mask;
use crate::skin::reduce_skin_weights;
use crate::{ConvertError, log_stream_summary};

/// The converted splat cloud, ready to serialize.
#[derive(Debug, Clone)]
pub struct ConvertedSplats {
    pub splats: Vec<SplatRecord>,
    pub weights: Vec<WeightRecord>,
    pub animation: Option<PackedAnimation>,
    pub joints: Option<Vec<Vec3>>,
    pub parents: Option<Vec<i32>>,
    pub header: SplatHeader,
}

fn to_points(array: &TensorData) -> Vec<Vec3> {
    array
        .iter_rows()
        .map(|p| Vec3::new(p[0] as f32, p[1] as f32, p[2] as f32))
        .collect()
}

/// Run the splat pipeline: filter, decompose, normalize colors, reduce
/// weights, convert coordinates and pack the animation.
///
/// A companion `skeleton` provides `parents.bin` when the cloud carries no
/// hierarchy of its own, and its joint names end up in the header.
pub fn convert_splats(
    source: &SplatSource,
    config: &ConvertConfig,
    skeleton: Option<&SkeletonSource>,
) -> Result<ConvertedSplats, ConvertError> {
    let _span = tracing::trace_span!("ConvertSplats").entered();

    let total = source.num_splats();
    let kept = opacity_mask(&source.opacity, config.opacity_threshold);
    let removed = total - kept.len();
    log::info!(
        "Filtering splats with opacity < {}: removing {removed} of {total}",
        config.opacity_threshold
    );
    if total > 0 {
        log::info!(
            "{} splats remain ({:.1}%)",
            kept.len(),
            100.0 * kept.len() as f64 / total as f64
        );
    }

    let position = source.position.select_rows(&kept);
    let covariance = source.covariance.select_rows(&kept);
    let color = source.color.select_rows(&kept);
    let opacity = source.opacity.select_rows(&kept);
    let skin_weights = source.skin_weights.select_rows(&kept);

    log::info!("Decomposing {} covariance matrices", kept.len());
    let decomposed = decompose_all(&covariance);
    if decomposed.fallbacks > 0 {
        log::warn!(
            "{} splats fell back to default scale and rotation",
            decomposed.fallbacks
        );
    }

    let colors = normalize_colors(&color);

    log::info!("Reducing skin weights over {} bones", source.num_bones());
    let weights = reduce_skin_weights(&skin_weights);

    let convert = !config.keep_source_coords;
    let mut positions = to_points(&position);
    let mut rotations = decomposed.rotations;
    if convert {
        positions.iter_mut().for_each(|p| *p = convert_point(*p));
        rotations.iter_mut().for_each(|q| *q = convert_quat(*q));
    }

    let bounds = Bounds::from_points(&positions);
    if positions.is_empty() {
        log::warn!("No splats left after filtering, bounds default to zero");
    }

    let splats = positions
        .iter()
        .zip(&decomposed.scales)
        .zip(&rotations)
        .zip(&colors)
        .zip(&opacity.data)
        .map(|((((p, s), q), c), o)| SplatRecord {
            position: p.to_array(),
            scale: s.to_array(),
            rotation: q.to_array(),
            color: *c,
            opacity: *o as f32,
        })
        .collect();

    if let Some(poses) = &source.poses {
        log::info!("Packing {} animation frames", poses.num_frames());
    }
    let animation = match &source.poses {
        Some(PoseStream::Split {
            rotations,
            translations,
        }) => {
            let (rotations, translations) = if convert {
                (convert_quats(rotations)?, convert_points(translations)?)
            } else {
                (rotations.clone(), translations.clone())
            };
            Some(pack_animation(&rotations, &translations)?)
        }
        Some(PoseStream::Packed(poses)) => {
            log::info!("Pose stream is already packed, writing it unchanged");
            Some(PackedAnimation::from_packed(poses))
        }
        None => None,
    };

    let joints = source
        .joint_positions
        .as_ref()
        .map(|joints| {
            let joints = if convert {
                convert_points(joints)?
            } else {
                joints.clone()
            };
            Ok::<_, ConvertError>(to_points(&joints))
        })
        .transpose()?;

    let parents = match (&source.bone_parents, skeleton) {
        (Some(parents), _) => Some(parents.to_i32_vec()),
        (None, Some(skeleton)) => {
            log::info!("Using skeleton parents for {} bones", skeleton.parents.rows());
            Some(skeleton.parents.to_i32_vec())
        }
        (None, None) => None,
    };

    let mut header = HeaderBuilder::new(kept.len(), source.num_bones(), bounds);
    if let Some(animation) = &animation {
        header = header.animation(animation.shape.clone());
    }
    if let Some(joints) = &joints {
        header = header.joints(joints.len());
    }
    if let Some(parents) = &parents {
        header = header.parents(parents.len());
    }
    if let Some(names) = skeleton.and_then(|s| s.joint_names.clone()) {
        header = header.bone_names(names);
    }

    Ok(ConvertedSplats {
        splats,
        weights,
        animation,
        joints,
        parents,
        header: header.build(),
    })
}

impl ConvertedSplats {
    pub fn log_summary(&self) {
        log_stream_summary(
            SPLATS_FILE,
            &[self.splats.len()],
            self.splats.iter().flat_map(|s| s.position),
        );
        log_stream_summary(
            WEIGHTS_FILE,
            &[self.weights.len(), 4],
            self.weights.iter().flat_map(|w| w.bone_weights),
        );
        if let Some(animation) = &self.animation {
            log_stream_summary(
                ANIMATION_FILE,
                &animation.shape,
                animation.values.iter().copied(),
            );
        }
        if let Some(joints) = &self.joints {
            log_stream_summary(
                JOINTS_FILE,
                &[joints.len(), 3],
                joints.iter().flat_map(|j| j.to_array()),
            );
        }
        if let Some(parents) = &self.parents {
            log_stream_summary(
                PARENTS_FILE,
                &[parents.len()],
                parents.iter().map(|&p| p as f32),
            );
        }
    }

    pub fn into_bundle(self) -> Result<Bundle, ConvertError> {
        let mut bundle = Bundle::new(&self.header)?;
        bundle.add_file(SPLATS_FILE, encode_records(&self.splats));
        bundle.add_file(WEIGHTS_FILE, encode_records(&self.weights));
        if let Some(animation) = &self.animation {
            bundle.add_file(ANIMATION_FILE, animation.to_bytes());
        }
        if let Some(joints) = &self.joints {
            let values: Vec<f32> = joints.iter().flat_map(|j| j.to_array()).collect();
            bundle.add_file(JOINTS_FILE, encode_records(&values));
        }
        if let Some(parents) = &self.parents {
            bundle.add_file(PARENTS_FILE, encode_records(parents));
        }
        Ok(bundle)
    }
}
