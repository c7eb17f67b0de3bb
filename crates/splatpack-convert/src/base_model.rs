use splatpack_serde::header::{BaseModelHeader, BaseModelStreams};
use splatpack_serde::writer::encode_records;
use splatpack_serde::{BaseModelSource, Bundle, StreamDescriptor, StreamFormat, TensorData};

use crate::ConvertError;
use crate::config::ConvertConfig;
use crate::coords::{convert_points, convert_quats};

pub const REST_TRANSLATIONS_FILE: &str = "rest_translations.bin";
pub const REST_ROTATIONS_FILE: &str = "rest_rotations.bin";
pub const MODEL_PARENTS_FILE: &str = "parents.bin";
pub const COMP_TRANSLATIONS_FILE: &str = "comp_translations.bin";
pub const COMP_ROTATIONS_FILE: &str = "comp_rotations.bin";
pub const VERTS_FILE: &str = "verts.bin";

#[derive(Clone, Copy)]
enum Kind {
    Points,
    Quats,
    Indices,
}

fn add_stream(
    bundle: &mut Bundle,
    file: &str,
    array: &TensorData,
    kind: Kind,
    convert: bool,
) -> Result<StreamDescriptor, ConvertError> {
    let (bytes, format, stride) = match kind {
        Kind::Indices => (
            encode_records(&array.to_i32_vec()),
            StreamFormat::Int32,
            size_of::<i32>(),
        ),
        Kind::Points | Kind::Quats => {
            let converted = match (kind, convert) {
                (Kind::Points, true) => convert_points(array)?,
                (Kind::Quats, true) => convert_quats(array)?,
                _ => array.clone(),
            };
            (
                encode_records(&converted.to_f32_vec()),
                StreamFormat::Float32,
                array.row_width() * size_of::<f32>(),
            )
        }
    };
    bundle.add_file(file, bytes);
    Ok(StreamDescriptor::shaped(file, format, array.shape.clone(), stride).with_count(array.rows()))
}

/// Write the joint data and vertices of a template body model. Only the
/// arrays present in the input are written.
pub fn convert_base_model(
    model: &BaseModelSource,
    config: &ConvertConfig,
) -> Result<Bundle, ConvertError> {
    if !model.has_joints() {
        log::warn!("Base model has no joint data, writing without joints");
    }

    let convert = !config.keep_source_coords;
    let mut files = Bundle::default();
    let mut streams = BaseModelStreams::default();

    let mut stream = |file: &str, array: &Option<TensorData>, kind: Kind| {
        array
            .as_ref()
            .map(|a| add_stream(&mut files, file, a, kind, convert))
            .transpose()
    };

    streams.rest_translations = stream(
        REST_TRANSLATIONS_FILE,
        &model.rest_translations,
        Kind::Points,
    )?;
    streams.rest_rotations = stream(REST_ROTATIONS_FILE, &model.rest_rotations, Kind::Quats)?;
    streams.parents = stream(MODEL_PARENTS_FILE, &model.parents, Kind::Indices)?;
    streams.comp_translations = stream(
        COMP_TRANSLATIONS_FILE,
        &model.comp_translations,
        Kind::Points,
    )?;
    streams.comp_rotations = stream(COMP_ROTATIONS_FILE, &model.comp_rotations, Kind::Quats)?;
    streams.verts = stream(VERTS_FILE, &model.verts, Kind::Points)?;

    if let Some(verts) = &model.verts {
        log::info!("Base model has {} vertices", verts.rows());
    }

    let header = BaseModelHeader {
        base_model: streams,
    };
    files.set_header(&header)?;
    Ok(files)
}
