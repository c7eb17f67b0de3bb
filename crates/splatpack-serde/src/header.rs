use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::writer::{SPLAT_STRIDE, WEIGHT_STRIDE};

pub const HEADER_FILE: &str = "header.json";
pub const SPLATS_FILE: &str = "splats.bin";
pub const WEIGHTS_FILE: &str = "weights.bin";
pub const ANIMATION_FILE: &str = "animation.bin";
pub const JOINTS_FILE: &str = "joints.bin";
pub const PARENTS_FILE: &str = "parents.bin";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamFormat {
    /// Fixed-size records with mixed field types.
    Interleaved,
    Float32,
    Int32,
}

/// Where a stream lives and how to step through it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    pub file: String,
    pub format: StreamFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<Vec<usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    /// Bytes per record.
    pub stride: usize,
}

impl StreamDescriptor {
    pub fn counted(file: &str, format: StreamFormat, count: usize, stride: usize) -> Self {
        Self {
            file: file.to_owned(),
            format,
            shape: None,
            count: Some(count),
            stride,
        }
    }

    pub fn shaped(file: &str, format: StreamFormat, shape: Vec<usize>, stride: usize) -> Self {
        Self {
            file: file.to_owned(),
            format,
            shape: Some(shape),
            count: None,
            stride,
        }
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl Bounds {
    /// Axis-aligned bounds of the points. Empty input gives a zero box.
    pub fn from_points(points: &[Vec3]) -> Self {
        let Some(first) = points.first() else {
            return Self {
                min: [0.0; 3],
                max: [0.0; 3],
            };
        };
        let (min, max) = points
            .iter()
            .fold((*first, *first), |(min, max), p| (min.min(*p), max.max(*p)));
        Self {
            min: min.to_array(),
            max: max.to_array(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplatHeader {
    pub num_splats: usize,
    pub num_bones: usize,
    pub num_frames: usize,
    pub bounds: Bounds,
    pub splats: StreamDescriptor,
    pub weights: StreamDescriptor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub animation: Option<StreamDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joints: Option<StreamDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parents: Option<StreamDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bone_names: Option<Vec<String>>,
}

/// Collects the stream descriptors of a splat bundle. The splat and weight
/// streams are always present, everything else only once registered.
pub struct HeaderBuilder {
    header: SplatHeader,
}

impl HeaderBuilder {
    pub fn new(num_splats: usize, num_bones: usize, bounds: Bounds) -> Self {
        Self {
            header: SplatHeader {
                num_splats,
                num_bones,
                num_frames: 0,
                bounds,
                splats: StreamDescriptor::counted(
                    SPLATS_FILE,
                    StreamFormat::Interleaved,
                    num_splats,
                    SPLAT_STRIDE,
                ),
                weights: StreamDescriptor::counted(
                    WEIGHTS_FILE,
                    StreamFormat::Interleaved,
                    num_splats,
                    WEIGHT_STRIDE,
                ),
                animation: None,
                joints: None,
                parents: None,
                bone_names: None,
            },
        }
    }

    /// `shape` is `[frames, bones, 16]` for packed matrices.
    pub fn animation(mut self, shape: Vec<usize>) -> Self {
        self.header.num_frames = shape.first().copied().unwrap_or(0);
        let stride = shape.last().copied().unwrap_or(0) * size_of::<f32>();
        self.header.animation = Some(StreamDescriptor::shaped(
            ANIMATION_FILE,
            StreamFormat::Float32,
            shape,
            stride,
        ));
        self
    }

    pub fn joints(mut self, count: usize) -> Self {
        self.header.joints = Some(StreamDescriptor::counted(
            JOINTS_FILE,
            StreamFormat::Float32,
            count,
            3 * size_of::<f32>(),
        ));
        self
    }

    pub fn parents(mut self, count: usize) -> Self {
        self.header.parents = Some(StreamDescriptor::counted(
            PARENTS_FILE,
            StreamFormat::Int32,
            count,
            size_of::<i32>(),
        ));
        self
    }

    pub fn bone_names(mut self, names: Vec<String>) -> Self {
        self.header.bone_names = Some(names);
        self
    }

    pub fn build(self) -> SplatHeader {
        self.header
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkeletonHeader {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bone_names: Option<Vec<String>>,
    pub parents: StreamDescriptor,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseModelStreams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rest_translations: Option<StreamDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rest_rotations: Option<StreamDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parents: Option<StreamDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comp_translations: Option<StreamDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comp_rotations: Option<StreamDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verts: Option<StreamDescriptor>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseModelHeader {
    pub base_model: BaseModelStreams,
}
