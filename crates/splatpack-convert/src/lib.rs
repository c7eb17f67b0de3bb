pub mod animation;
pub mod base_model;
pub mod color;
pub mod config;
pub mod coords;
pub mod covariance;
pub mod filter;
pub mod skeleton;
pub mod skin;
pub mod splats;

#[cfg(test)]
mod tests;

use splatpack_serde::{LoadError, WriteError};
use thiserror::Error;

pub use base_model::convert_base_model;
pub use config::ConvertConfig;
pub use coords::CoordError;
pub use skeleton::convert_skeleton;
pub use splats::{ConvertedSplats, convert_splats};

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("Failed to load input: {0}")]
    Load(#[from] LoadError),

    #[error("Failed to write output: {0}")]
    Write(#[from] WriteError),

    #[error(transparent)]
    Coord(#[from] CoordError),

    #[error("Array '{name}' has shape {shape:?}, expected {expected}")]
    Shape {
        name: &'static str,
        shape: Vec<usize>,
        expected: String,
    },
}

/// The assets a run can produce, each written to its own directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Splats,
    Skeleton,
    BaseModel,
}

impl AssetKind {
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Splats => "splats",
            Self::Skeleton => "skeleton",
            Self::BaseModel => "base_model",
        }
    }
}

impl std::fmt::Display for AssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Log the shape and value range of one emitted stream.
pub fn log_stream_summary(name: &str, shape: &[usize], values: impl Iterator<Item = f32>) {
    let range = values.filter(|v| !v.is_nan()).fold(None, |range, v| match range {
        None => Some((v, v)),
        Some((min, max)) => Some((f32::min(min, v), f32::max(max, v))),
    });
    match range {
        Some((min, max)) => log::info!("{name}: shape {shape:?}, range [{min}, {max}]"),
        None => log::info!("{name}: shape {shape:?}, empty"),
    }
}
