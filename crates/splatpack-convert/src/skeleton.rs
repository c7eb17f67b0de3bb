use splatpack_serde::header::{PARENTS_FILE, SkeletonHeader};
use splatpack_serde::writer::encode_records;
use splatpack_serde::{Bundle, SkeletonSource, StreamDescriptor, StreamFormat};

use crate::ConvertError;

/// Write a bare skeleton: `parents.bin` as int32 plus the joint names.
pub fn convert_skeleton(skeleton: &SkeletonSource) -> Result<Bundle, ConvertError> {
    let parents = skeleton.parents.to_i32_vec();
    let roots = parents.iter().filter(|p| **p < 0).count();
    log::info!("Skeleton has {} joints, {roots} roots", parents.len());

    let bone_names = skeleton.joint_names.clone();
    if let Some(names) = bone_names.as_ref().filter(|n| n.len() != parents.len()) {
        log::warn!(
            "Skeleton has {} joint names for {} joints",
            names.len(),
            parents.len()
        );
    }

    let header = SkeletonHeader {
        bone_names,
        parents: StreamDescriptor::counted(
            PARENTS_FILE,
            StreamFormat::Int32,
            parents.len(),
            size_of::<i32>(),
        ),
    };

    let mut bundle = Bundle::new(&header)?;
    bundle.add_file(PARENTS_FILE, encode_records(&parents));
    Ok(bundle)
}
