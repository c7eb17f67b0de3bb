use std::path::Path;

use bytemuck::{Pod, Zeroable};
use serde::Serialize;
use thiserror::Error;

use crate::header::HEADER_FILE;

pub const SPLAT_STRIDE: usize = 48;
pub const WEIGHT_STRIDE: usize = 24;

/// One record of `splats.bin`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct SplatRecord {
    pub position: [f32; 3],
    pub scale: [f32; 3],
    /// Quaternion, x y z w.
    pub rotation: [f32; 4],
    pub color: [u8; 4],
    pub opacity: f32,
}

/// One record of `weights.bin`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct WeightRecord {
    pub bone_indices: [u16; 4],
    pub bone_weights: [f32; 4],
}

const _: () = assert!(size_of::<SplatRecord>() == SPLAT_STRIDE);
const _: () = assert!(size_of::<WeightRecord>() == WEIGHT_STRIDE);

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("IO error while writing bundle.")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize header.")]
    Header(#[from] serde_json::Error),
}

pub fn encode_records<T: Pod>(records: &[T]) -> Vec<u8> {
    bytemuck::cast_slice(records).to_vec()
}

/// Reads records back from a stream. `None` if the length is not a whole
/// number of records.
pub fn decode_records<T: Pod>(bytes: &[u8]) -> Option<Vec<T>> {
    let stride = size_of::<T>();
    if stride == 0 || bytes.len() % stride != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(stride)
            .map(bytemuck::pod_read_unaligned)
            .collect(),
    )
}

/// All files of one converted asset, held in memory until written.
#[derive(Debug, Clone, Default)]
pub struct Bundle {
    header: serde_json::Value,
    files: Vec<(String, Vec<u8>)>,
}

impl Bundle {
    pub fn new(header: &impl Serialize) -> Result<Self, WriteError> {
        Ok(Self {
            header: serde_json::to_value(header)?,
            files: vec![],
        })
    }

    /// Replace the header, for assets whose header depends on the files.
    pub fn set_header(&mut self, header: &impl Serialize) -> Result<(), WriteError> {
        self.header = serde_json::to_value(header)?;
        Ok(())
    }

    pub fn add_file(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        self.files.push((name.into(), bytes));
    }

    pub fn header(&self) -> &serde_json::Value {
        &self.header
    }

    pub fn file(&self, name: &str) -> Option<&[u8]> {
        self.files
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, bytes)| bytes.as_slice())
    }

    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|(n, _)| n.as_str())
    }

    /// Replace the contents of `dir` with this bundle. If writing fails
    /// halfway the directory is removed again.
    pub fn write_to_dir(&self, dir: &Path) -> Result<(), WriteError> {
        if dir.exists() {
            std::fs::remove_dir_all(dir)?;
        }
        std::fs::create_dir_all(dir)?;

        let result = self.write_files(dir);
        if result.is_err() {
            if let Err(e) = std::fs::remove_dir_all(dir) {
                log::warn!("Failed to clean up {}: {e}", dir.display());
            }
        }
        result
    }

    fn write_files(&self, dir: &Path) -> Result<(), WriteError> {
        for (name, bytes) in &self.files {
            log::info!("Writing {name} ({} bytes)", bytes.len());
            std::fs::write(dir.join(name), bytes)?;
        }
        let header = serde_json::to_string_pretty(&self.header)?;
        std::fs::write(dir.join(HEADER_FILE), header)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn splat_record_layout() {
        let record = SplatRecord {
            position: [1.0, 2.0, 3.0],
            scale: [0.1, 0.2, 0.3],
            rotation: [0.0, 0.0, 0.0, 1.0],
            color: [10, 20, 30, 255],
            opacity: 0.5,
        };
        let bytes = encode_records(&[record, record]);
        assert_eq!(bytes.len(), 2 * SPLAT_STRIDE);
        assert_eq!(&bytes[0..4], &1.0f32.to_le_bytes());
        assert_eq!(&bytes[36..40], &1.0f32.to_le_bytes());
        assert_eq!(&bytes[40..44], &[10, 20, 30, 255]);
        assert_eq!(&bytes[44..48], &0.5f32.to_le_bytes());
    }

    #[test]
    fn weight_record_layout() {
        let record = WeightRecord {
            bone_indices: [4, 5, 0, 1],
            bone_weights: [0.7, 0.1, 0.05, 0.05],
        };
        let bytes = encode_records(&[record]);
        assert_eq!(bytes.len(), WEIGHT_STRIDE);
        assert_eq!(&bytes[0..8], &[4, 0, 5, 0, 0, 0, 1, 0]);
        assert_eq!(&bytes[8..12], &0.7f32.to_le_bytes());
        assert_eq!(decode_records::<WeightRecord>(&bytes), Some(vec![record]));
    }

    #[test]
    fn decode_rejects_partial_records() {
        assert!(decode_records::<SplatRecord>(&[0u8; 47]).is_none());
        assert_eq!(decode_records::<SplatRecord>(&[]), Some(vec![]));
    }

    #[test]
    fn bundle_replaces_directory_contents() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("splats");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("stale.bin"), b"old").unwrap();

        let mut bundle = Bundle::new(&json!({"numSplats": 0})).unwrap();
        bundle.add_file("splats.bin", vec![]);
        bundle.write_to_dir(&dir).unwrap();

        assert!(!dir.join("stale.bin").exists());
        assert!(dir.join("splats.bin").exists());
        let header: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.join(HEADER_FILE)).unwrap())
                .unwrap();
        assert_eq!(header, json!({"numSplats": 0}));
    }

    #[test]
    fn bundle_lookup_by_name() {
        let mut bundle = Bundle::default();
        bundle.add_file("a.bin", vec![1, 2]);
        bundle.add_file("b.bin", vec![3]);
        bundle.set_header(&json!({"x": 1})).unwrap();
        assert_eq!(bundle.file("b.bin"), Some(&[3u8][..]));
        assert!(bundle.file("c.bin").is_none());
        assert_eq!(bundle.file_names().collect::<Vec<_>>(), vec!["a.bin", "b.bin"]);
        assert_eq!(bundle.header()["x"], 1);
    }
}
