use crate::coords::convert_quat;
use crate::covariance::decompose_covariance;
use crate::{ConvertConfig, convert_splats};
use assert_approx_eq::assert_approx_eq;
use glam::{EulerRot, Mat3, Quat, Vec3};
use splatpack_serde::header::{
    ANIMATION_FILE, JOINTS_FILE, PARENTS_FILE, SPLATS_FILE, WEIGHTS_FILE,
};
use splatpack_serde::writer::decode_records;
use splatpack_serde::{
    Bundle, SkeletonSource, SplatRecord, SplatSource, TensorData, TensorMap, WeightRecord,
};

const BONES: usize = 6;
const FRAMES: usize = 2;

fn tensor(shape: &[usize], data: Vec<f64>) -> TensorData {
    TensorData::new(shape.to_vec(), data).unwrap()
}

/// Three splats, the first one nearly transparent.
fn artifact() -> TensorMap {
    let mut map = TensorMap::new();
    map.insert(
        "position",
        tensor(&[3, 3], vec![0.0, 0.0, 0.0, 1.0, 2.0, 3.0, -1.0, -2.0, -3.0]),
    );
    let isotropic = [4.0, 0.0, 0.0, 0.0, 4.0, 0.0, 0.0, 0.0, 4.0];
    map.insert("covariance", tensor(&[3, 3, 3], isotropic.repeat(3)));
    map.insert(
        "color",
        tensor(&[3, 3], vec![0.0, 0.0, 0.0, 1.0, 0.5, 0.0, 0.2, 0.4, 0.6]),
    );
    map.insert("opacity", tensor(&[3], vec![0.05, 0.5, 0.9]));
    let weights = [0.05, 0.05, 0.05, 0.05, 0.7, 0.1];
    map.insert("skin_weights", tensor(&[3, BONES], weights.repeat(3)));
    map
}

fn with_animation(mut map: TensorMap) -> TensorMap {
    let rotations = [0.0, 0.0, 0.0, 1.0].repeat(FRAMES * BONES);
    let translations = (0..FRAMES * BONES * 3).map(|i| i as f64).collect();
    map.insert("skeleton_rotations", tensor(&[FRAMES, BONES, 4], rotations));
    map.insert(
        "skeleton_translations",
        tensor(&[FRAMES, BONES, 3], translations),
    );
    map.insert(
        "joint_positions",
        tensor(&[BONES, 3], (0..BONES * 3).map(|i| i as f64).collect()),
    );
    map.insert(
        "bone_parents",
        tensor(&[BONES], vec![-1.0, 0.0, 1.0, 2.0, 3.0, 4.0]),
    );
    map
}

fn splats(bundle: &Bundle) -> Vec<SplatRecord> {
    decode_records(bundle.file(SPLATS_FILE).unwrap()).unwrap()
}

#[test]
fn transparent_splats_are_dropped() {
    let source = SplatSource::load(&artifact()).unwrap();
    let bundle = convert_splats(&source, &ConvertConfig::default(), None)
        .unwrap()
        .into_bundle()
        .unwrap();

    let header = bundle.header();
    assert_eq!(header["numSplats"], 2);
    assert_eq!(header["numBones"], BONES);
    assert_eq!(header["numFrames"], 0);
    assert_eq!(bundle.file(SPLATS_FILE).unwrap().len(), 2 * 48);
    assert_eq!(bundle.file(WEIGHTS_FILE).unwrap().len(), 2 * 24);

    let records = splats(&bundle);
    assert_eq!(records[0].opacity, 0.5);
    assert_eq!(records[1].opacity, 0.9);
    assert_eq!(records[0].color, [255, 127, 0, 255]);
    assert_eq!(records[1].color, [51, 102, 153, 255]);

    for name in [ANIMATION_FILE, JOINTS_FILE, PARENTS_FILE] {
        assert!(bundle.file(name).is_none());
    }
    assert!(header.get("animation").is_none());
}

#[test]
fn positions_and_bounds_are_converted() {
    let source = SplatSource::load(&artifact()).unwrap();
    let bundle = convert_splats(&source, &ConvertConfig::default(), None)
        .unwrap()
        .into_bundle()
        .unwrap();

    let records = splats(&bundle);
    assert_eq!(records[0].position, [1.0, -2.0, -3.0]);
    assert_eq!(records[1].position, [-1.0, 2.0, 3.0]);

    let bounds = &bundle.header()["bounds"];
    assert_eq!(bounds["min"], serde_json::json!([-1.0, -2.0, -3.0]));
    assert_eq!(bounds["max"], serde_json::json!([1.0, 2.0, 3.0]));
}

#[test]
fn source_coordinates_can_be_kept() {
    let source = SplatSource::load(&artifact()).unwrap();
    let config = ConvertConfig {
        keep_source_coords: true,
        ..Default::default()
    };
    let bundle = convert_splats(&source, &config, None)
        .unwrap()
        .into_bundle()
        .unwrap();
    assert_eq!(splats(&bundle)[0].position, [1.0, 2.0, 3.0]);
}

#[test]
fn isotropic_covariance_gives_uniform_scale() {
    let source = SplatSource::load(&artifact()).unwrap();
    let converted = convert_splats(&source, &ConvertConfig::default(), None).unwrap();
    for record in &converted.splats {
        for s in record.scale {
            assert_approx_eq!(s, 2.0, 1e-5);
        }
        let rotation = Quat::from_array(record.rotation);
        assert!(
            rotation.abs_diff_eq(Quat::IDENTITY, 1e-6),
            "isotropic rotation {rotation:?} should be the identity"
        );
    }
}

/// Row-major `R S² Rᵀ`.
fn rotated_covariance(scale: Vec3, rotation: Quat) -> Vec<f64> {
    let r = Mat3::from_quat(rotation);
    let cov = r * Mat3::from_diagonal(scale * scale) * r.transpose();
    cov.transpose().to_cols_array().map(f64::from).to_vec()
}

#[test]
fn decomposed_rotations_are_converted() {
    let cov = rotated_covariance(
        Vec3::new(0.5, 1.0, 2.0),
        Quat::from_euler(EulerRot::XYZ, 0.4, -0.7, 1.2),
    );
    let mut map = artifact();
    map.insert("covariance", tensor(&[3, 3, 3], cov.repeat(3)));
    let source = SplatSource::load(&map).unwrap();

    let (_, decomposed) = decompose_covariance(&cov).unwrap();
    let converted = convert_quat(decomposed);
    assert_ne!(converted, decomposed);

    let records = convert_splats(&source, &ConvertConfig::default(), None)
        .unwrap()
        .splats;
    for record in &records {
        assert_eq!(record.rotation, converted.to_array());
    }

    let config = ConvertConfig {
        keep_source_coords: true,
        ..Default::default()
    };
    let records = convert_splats(&source, &config, None).unwrap().splats;
    for record in &records {
        assert_eq!(record.rotation, decomposed.to_array());
    }
}

#[test]
fn weights_keep_strongest_bones() {
    let source = SplatSource::load(&artifact()).unwrap();
    let bundle = convert_splats(&source, &ConvertConfig::default(), None)
        .unwrap()
        .into_bundle()
        .unwrap();
    let weights: Vec<WeightRecord> = decode_records(bundle.file(WEIGHTS_FILE).unwrap()).unwrap();
    for record in weights {
        assert_eq!(record.bone_indices[..2], [4, 5]);
        assert_approx_eq!(record.bone_weights[0], 0.7 / 0.9, 1e-5);
        assert_approx_eq!(record.bone_weights.iter().sum::<f32>(), 1.0, 1e-5);
    }
}

#[test]
fn animation_joints_and_parents_are_written() {
    let source = SplatSource::load(&with_animation(artifact())).unwrap();
    let bundle = convert_splats(&source, &ConvertConfig::default(), None)
        .unwrap()
        .into_bundle()
        .unwrap();

    let header = bundle.header();
    assert_eq!(header["numFrames"], FRAMES);
    assert_eq!(
        header["animation"]["shape"],
        serde_json::json!([FRAMES, BONES, 16])
    );
    assert_eq!(header["joints"]["count"], BONES);
    assert_eq!(header["parents"]["count"], BONES);

    let animation: Vec<f32> = decode_records(bundle.file(ANIMATION_FILE).unwrap()).unwrap();
    assert_eq!(animation.len(), FRAMES * BONES * 16);
    // Second bone of the first frame, translation (3, 4, 5) converted.
    assert_eq!(animation[16 + 12..16 + 16], [3.0, -4.0, -5.0, 1.0]);

    let joints: Vec<f32> = decode_records(bundle.file(JOINTS_FILE).unwrap()).unwrap();
    assert_eq!(joints[3..6], [3.0, -4.0, -5.0]);

    let parents: Vec<i32> = decode_records(bundle.file(PARENTS_FILE).unwrap()).unwrap();
    assert_eq!(parents, vec![-1, 0, 1, 2, 3, 4]);
}

#[test]
fn skeleton_supplies_missing_parents() {
    let source = SplatSource::load(&artifact()).unwrap();
    let skeleton = SkeletonSource {
        parents: tensor(&[3], vec![-1.0, 0.0, 0.0]),
        joint_names: Some(vec!["root".into(), "left".into(), "right".into()]),
    };
    let bundle = convert_splats(&source, &ConvertConfig::default(), Some(&skeleton))
        .unwrap()
        .into_bundle()
        .unwrap();

    let parents: Vec<i32> = decode_records(bundle.file(PARENTS_FILE).unwrap()).unwrap();
    assert_eq!(parents, vec![-1, 0, 0]);
    assert_eq!(bundle.header()["boneNames"][1], "left");
}

#[test]
fn own_parents_win_over_skeleton() {
    let source = SplatSource::load(&with_animation(artifact())).unwrap();
    let skeleton = SkeletonSource {
        parents: tensor(&[1], vec![-1.0]),
        joint_names: None,
    };
    let converted = convert_splats(&source, &ConvertConfig::default(), Some(&skeleton)).unwrap();
    assert_eq!(converted.parents.map(|p| p.len()), Some(BONES));
}

#[test]
fn everything_filtered_gives_empty_streams() {
    let source = SplatSource::load(&artifact()).unwrap();
    let config = ConvertConfig {
        opacity_threshold: 0.95,
        ..Default::default()
    };
    let bundle = convert_splats(&source, &config, None)
        .unwrap()
        .into_bundle()
        .unwrap();
    assert_eq!(bundle.header()["numSplats"], 0);
    assert_eq!(bundle.file(SPLATS_FILE).unwrap().len(), 0);
    assert_eq!(bundle.file(WEIGHTS_FILE).unwrap().len(), 0);
    assert_eq!(
        bundle.header()["bounds"]["min"],
        serde_json::json!([0.0, 0.0, 0.0])
    );
}

#[test]
fn packed_poses_pass_through() {
    let mut map = artifact();
    map.insert("poses", tensor(&[3, 2, 4, 4], vec![0.25; 3 * 2 * 16]));
    let source = SplatSource::load(&map).unwrap();
    let converted = convert_splats(&source, &ConvertConfig::default(), None).unwrap();
    let animation = converted.animation.as_ref().unwrap();
    assert_eq!(animation.shape, vec![3, 2, 16]);
    assert!(animation.values.iter().all(|v| *v == 0.25));
    assert_eq!(converted.header.num_frames, 3);
}
