// Streams are written in host byte order through bytemuck.
#[cfg(not(target_endian = "little"))]
compile_error!("splatpack bundles are little-endian and can only be written on little-endian hosts");

pub mod container;
pub mod header;
pub mod loader;
pub mod tensor;
pub mod writer;

pub use container::load_safetensors;
pub use header::{Bounds, HeaderBuilder, SplatHeader, StreamDescriptor, StreamFormat};
pub use loader::{
    BaseModelSource, LoadError, PoseStream, SkeletonSource, SplatSource, TensorMap, TensorSource,
};
pub use tensor::TensorData;
pub use writer::{Bundle, SplatRecord, WeightRecord, WriteError};
