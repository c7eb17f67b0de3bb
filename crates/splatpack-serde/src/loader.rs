use std::collections::HashMap;

use thiserror::Error;

use crate::tensor::TensorData;

/// Source keys, first present alias wins.
pub mod keys {
    pub const POSITION: &[&str] = &["position", "mu"];
    pub const COVARIANCE: &[&str] = &["covariance", "cov"];
    pub const COLOR: &[&str] = &["color"];
    pub const OPACITY: &[&str] = &["opacity"];
    pub const SKIN_WEIGHTS: &[&str] = &["skin_weights", "W"];
    pub const POSE_ROTATIONS: &[&str] = &["skeleton_rotations", "poses.rotations"];
    pub const POSE_TRANSLATIONS: &[&str] = &["skeleton_translations", "poses.translations"];
    pub const PACKED_POSES: &[&str] = &["poses", "body_pose"];
    pub const JOINT_POSITIONS: &[&str] = &["joint_positions"];
    pub const BONE_PARENTS: &[&str] = &["bone_parents", "parents"];

    pub const SKELETON_PARENTS: &[&str] = &["parents", "parent"];
    pub const SKELETON_NAMES: &[&str] = &["joint_names", "bone_names", "names"];

    pub const REST_TRANSLATIONS: &[&str] = &["joints.rest_translations"];
    pub const REST_ROTATIONS: &[&str] = &["joints.rest_rotations"];
    pub const MODEL_PARENTS: &[&str] = &["joints.parents"];
    pub const COMP_TRANSLATIONS: &[&str] = &["joints.comp_translations"];
    pub const COMP_ROTATIONS: &[&str] = &["joints.comp_rotations"];
    pub const VERTS: &[&str] = &["verts"];
}

/// Bone indices are emitted as u16.
pub const MAX_BONES: usize = u16::MAX as usize + 1;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("IO error while reading tensor container.")]
    Io(#[from] std::io::Error),

    #[error("Failed to decode tensor container: {0}")]
    Container(#[from] safetensors::SafeTensorError),

    #[error("Missing mandatory array '{0}'")]
    MissingKey(&'static str),

    #[error("Tensor '{name}' has unsupported dtype {dtype}")]
    UnsupportedDtype { name: String, dtype: String },

    #[error("Array '{name}' has shape {shape:?}, expected {expected}")]
    Shape {
        name: String,
        shape: Vec<usize>,
        expected: String,
    },

    #[error("Pose stream needs both rotations and translations, only '{0}' is present")]
    IncompletePose(&'static str),
}

/// Anything that hands out named numeric arrays.
pub trait TensorSource {
    fn tensor(&self, key: &str) -> Option<&TensorData>;

    /// String metadata stored next to the arrays.
    fn text(&self, key: &str) -> Option<&str>;

    fn find(&self, aliases: &[&str]) -> Option<&TensorData> {
        aliases.iter().find_map(|key| self.tensor(key))
    }

    fn find_text(&self, aliases: &[&str]) -> Option<&str> {
        aliases.iter().find_map(|key| self.text(key))
    }
}

#[derive(Debug, Clone, Default)]
pub struct TensorMap {
    tensors: HashMap<String, TensorData>,
    text: HashMap<String, String>,
}

impl TensorMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, tensor: TensorData) {
        self.tensors.insert(key.into(), tensor);
    }

    pub fn insert_text(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.text.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&TensorData> {
        self.tensors.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<TensorData> {
        self.tensors.remove(key)
    }

    pub fn tensor_names(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(String::as_str)
    }

    pub fn text_entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.text.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }
}

impl TensorSource for TensorMap {
    fn tensor(&self, key: &str) -> Option<&TensorData> {
        self.tensors.get(key)
    }

    fn text(&self, key: &str) -> Option<&str> {
        self.text.get(key).map(String::as_str)
    }
}

fn shape_error(name: &str, tensor: &TensorData, expected: impl Into<String>) -> LoadError {
    LoadError::Shape {
        name: name.to_owned(),
        shape: tensor.shape.clone(),
        expected: expected.into(),
    }
}

fn required(
    source: &dyn TensorSource,
    aliases: &'static [&'static str],
) -> Result<TensorData, LoadError> {
    source
        .find(aliases)
        .cloned()
        .ok_or(LoadError::MissingKey(aliases[0]))
}

/// Accepts `[n, width]`, plus `[n]` when `width == 1`.
fn as_rows(name: &str, tensor: TensorData, widths: &[usize]) -> Result<TensorData, LoadError> {
    let ok = match tensor.shape.as_slice() {
        [_] => widths.contains(&1),
        [_, w] => widths.contains(w),
        _ => false,
    };
    if !ok {
        let expected = widths
            .iter()
            .map(|w| if *w == 1 { "N".to_owned() } else { format!("N×{w}") })
            .collect::<Vec<_>>()
            .join(" or ");
        return Err(shape_error(name, &tensor, expected));
    }
    Ok(tensor)
}

/// Flattens `[n]` / `[n, 1]` to `[n]`.
fn as_column(name: &str, tensor: TensorData) -> Result<TensorData, LoadError> {
    let tensor = as_rows(name, tensor, &[1])?;
    let rows = tensor.rows();
    tensor
        .reshape(vec![rows])
        .map_err(|e| LoadError::Shape {
            name: name.to_owned(),
            shape: e.shape,
            expected: "N".to_owned(),
        })
}

fn optional_column(
    source: &dyn TensorSource,
    aliases: &'static [&'static str],
) -> Result<Option<TensorData>, LoadError> {
    source
        .find(aliases)
        .cloned()
        .map(|t| as_column(aliases[0], t))
        .transpose()
}

/// Per-frame per-bone pose data.
#[derive(Debug, Clone, PartialEq)]
pub enum PoseStream {
    /// Quaternions `[F, Bn, 4]` (x, y, z, w) and translations `[F, Bn, 3]`.
    Split {
        rotations: TensorData,
        translations: TensorData,
    },
    /// Already packed matrices, emitted as is.
    Packed(TensorData),
}

impl PoseStream {
    pub fn num_frames(&self) -> usize {
        match self {
            Self::Split { rotations, .. } => rotations.rows(),
            Self::Packed(poses) => poses.rows(),
        }
    }

    fn load(source: &dyn TensorSource) -> Result<Option<Self>, LoadError> {
        let rotations = source.find(keys::POSE_ROTATIONS);
        let translations = source.find(keys::POSE_TRANSLATIONS);

        match (rotations, translations) {
            (Some(rotations), Some(translations)) => {
                let name = keys::POSE_ROTATIONS[0];
                let [frames, bones, 4] = rotations.shape[..] else {
                    return Err(shape_error(name, rotations, "F×Bn×4"));
                };
                if translations.shape != [frames, bones, 3] {
                    return Err(shape_error(
                        keys::POSE_TRANSLATIONS[0],
                        translations,
                        format!("{frames}×{bones}×3"),
                    ));
                }
                Ok(Some(Self::Split {
                    rotations: rotations.clone(),
                    translations: translations.clone(),
                }))
            }
            (Some(_), None) => Err(LoadError::IncompletePose(keys::POSE_ROTATIONS[0])),
            (None, Some(_)) => Err(LoadError::IncompletePose(keys::POSE_TRANSLATIONS[0])),
            (None, None) => {
                let Some(packed) = source.find(keys::PACKED_POSES) else {
                    return Ok(None);
                };
                let name = keys::PACKED_POSES[0];
                let packed = match packed.shape[..] {
                    [_, _, 16] => packed.clone(),
                    [frames, bones, 4, 4] => {
                        packed.clone().reshape(vec![frames, bones, 16]).map_err(|e| {
                            LoadError::Shape {
                                name: name.to_owned(),
                                shape: e.shape,
                                expected: "F×Bn×16".to_owned(),
                            }
                        })?
                    }
                    _ => return Err(shape_error(name, packed, "F×Bn×16 or F×Bn×4×4")),
                };
                Ok(Some(Self::Packed(packed)))
            }
        }
    }
}

/// Everything the splat pipeline reads from an upstream artifact.
///
/// Mandatory arrays are validated to agree on the record count; optional
/// streams are `None` when the artifact does not carry them.
#[derive(Debug, Clone)]
pub struct SplatSource {
    /// `[N, 3]`
    pub position: TensorData,
    /// `[N, 3, 3]`
    pub covariance: TensorData,
    /// `[N, 3]` or `[N, 4]`
    pub color: TensorData,
    /// `[N]`
    pub opacity: TensorData,
    /// `[N, B]`
    pub skin_weights: TensorData,

    pub poses: Option<PoseStream>,
    /// `[J, 3]`
    pub joint_positions: Option<TensorData>,
    /// `[J]`
    pub bone_parents: Option<TensorData>,
}

impl SplatSource {
    pub fn load(source: &dyn TensorSource) -> Result<Self, LoadError> {
        let position = as_rows(
            keys::POSITION[0],
            required(source, keys::POSITION)?,
            &[3],
        )?;

        let covariance = required(source, keys::COVARIANCE)?;
        let covariance_shape = covariance.shape.clone();
        let covariance = match covariance_shape[..] {
            [n, 3, 3] | [n, 9] => covariance.reshape(vec![n, 3, 3]).map_err(|e| {
                LoadError::Shape {
                    name: keys::COVARIANCE[0].to_owned(),
                    shape: e.shape,
                    expected: "N×3×3".to_owned(),
                }
            })?,
            _ => return Err(shape_error(keys::COVARIANCE[0], &covariance, "N×3×3")),
        };

        let color = as_rows(keys::COLOR[0], required(source, keys::COLOR)?, &[3, 4])?;
        let opacity = as_column(keys::OPACITY[0], required(source, keys::OPACITY)?)?;

        let skin_weights = required(source, keys::SKIN_WEIGHTS)?;
        let bones = match skin_weights.shape[..] {
            [_, bones] if bones <= MAX_BONES => bones,
            _ => {
                return Err(shape_error(
                    keys::SKIN_WEIGHTS[0],
                    &skin_weights,
                    format!("N×B with B ≤ {MAX_BONES}"),
                ));
            }
        };
        log::debug!("Skin weights span {bones} bones");

        let num_splats = position.rows();
        for (name, tensor) in [
            (keys::COVARIANCE[0], &covariance),
            (keys::COLOR[0], &color),
            (keys::OPACITY[0], &opacity),
            (keys::SKIN_WEIGHTS[0], &skin_weights),
        ] {
            if tensor.rows() != num_splats {
                return Err(shape_error(
                    name,
                    tensor,
                    format!("{num_splats} records to match '{}'", keys::POSITION[0]),
                ));
            }
        }

        let joint_positions = source
            .find(keys::JOINT_POSITIONS)
            .cloned()
            .map(|t| as_rows(keys::JOINT_POSITIONS[0], t, &[3]))
            .transpose()?;

        Ok(Self {
            position,
            covariance,
            color,
            opacity,
            skin_weights,
            poses: PoseStream::load(source)?,
            joint_positions,
            bone_parents: optional_column(source, keys::BONE_PARENTS)?,
        })
    }

    pub fn num_splats(&self) -> usize {
        self.position.rows()
    }

    pub fn num_bones(&self) -> usize {
        self.skin_weights.row_width()
    }
}

/// A bare skeleton: the parent hierarchy plus optional joint names.
#[derive(Debug, Clone)]
pub struct SkeletonSource {
    /// `[J]`, a negative entry marks a root.
    pub parents: TensorData,
    pub joint_names: Option<Vec<String>>,
}

impl SkeletonSource {
    pub fn load(source: &dyn TensorSource) -> Result<Self, LoadError> {
        let parents = as_column(
            keys::SKELETON_PARENTS[0],
            required(source, keys::SKELETON_PARENTS)?,
        )?;

        let joint_names = source.find_text(keys::SKELETON_NAMES).and_then(|raw| {
            serde_json::from_str::<Vec<String>>(raw)
                .inspect_err(|e| log::warn!("Ignoring joint names, not a JSON string list: {e}"))
                .ok()
        });

        Ok(Self {
            parents,
            joint_names,
        })
    }
}

/// Rest/composed joint data and vertices of a template body model. Every
/// field is optional.
#[derive(Debug, Clone, Default)]
pub struct BaseModelSource {
    /// `[J, 3]`
    pub rest_translations: Option<TensorData>,
    /// `[J, 4]`
    pub rest_rotations: Option<TensorData>,
    /// `[J]`
    pub parents: Option<TensorData>,
    /// `[J, 3]`
    pub comp_translations: Option<TensorData>,
    /// `[J, 4]`
    pub comp_rotations: Option<TensorData>,
    /// `[V, 3]`
    pub verts: Option<TensorData>,
}

impl BaseModelSource {
    pub fn load(source: &dyn TensorSource) -> Result<Self, LoadError> {
        let rows = |aliases: &'static [&'static str], width: usize| {
            source
                .find(aliases)
                .cloned()
                .map(|t| as_rows(aliases[0], t, &[width]))
                .transpose()
        };

        Ok(Self {
            rest_translations: rows(keys::REST_TRANSLATIONS, 3)?,
            rest_rotations: rows(keys::REST_ROTATIONS, 4)?,
            parents: optional_column(source, keys::MODEL_PARENTS)?,
            comp_translations: rows(keys::COMP_TRANSLATIONS, 3)?,
            comp_rotations: rows(keys::COMP_ROTATIONS, 4)?,
            verts: rows(keys::VERTS, 3)?,
        })
    }

    pub fn has_joints(&self) -> bool {
        self.rest_translations.is_some()
            || self.rest_rotations.is_some()
            || self.parents.is_some()
            || self.comp_translations.is_some()
            || self.comp_rotations.is_some()
    }
}
