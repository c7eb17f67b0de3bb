use std::collections::HashMap;
use std::path::Path;

use half::{bf16, f16};
use safetensors::tensor::TensorView;
use safetensors::{Dtype, SafeTensors};

use crate::loader::{LoadError, TensorMap};
use crate::tensor::TensorData;

fn widen<const N: usize>(bytes: &[u8], convert: impl Fn([u8; N]) -> f64) -> Vec<f64> {
    bytes
        .chunks_exact(N)
        .map(|chunk| {
            let mut raw = [0u8; N];
            raw.copy_from_slice(chunk);
            convert(raw)
        })
        .collect()
}

fn decode_values(name: &str, dtype: Dtype, bytes: &[u8]) -> Result<Vec<f64>, LoadError> {
    let values = match dtype {
        Dtype::BOOL | Dtype::U8 => bytes.iter().map(|&b| b as f64).collect(),
        Dtype::I8 => bytes.iter().map(|&b| b as i8 as f64).collect(),
        Dtype::F16 => widen(bytes, |b| f16::from_le_bytes(b).to_f64()),
        Dtype::BF16 => widen(bytes, |b| bf16::from_le_bytes(b).to_f64()),
        Dtype::U16 => widen(bytes, |b| u16::from_le_bytes(b) as f64),
        Dtype::I16 => widen(bytes, |b| i16::from_le_bytes(b) as f64),
        Dtype::U32 => widen(bytes, |b| u32::from_le_bytes(b) as f64),
        Dtype::I32 => widen(bytes, |b| i32::from_le_bytes(b) as f64),
        Dtype::U64 => widen(bytes, |b| u64::from_le_bytes(b) as f64),
        Dtype::I64 => widen(bytes, |b| i64::from_le_bytes(b) as f64),
        Dtype::F32 => widen(bytes, |b| f32::from_le_bytes(b) as f64),
        Dtype::F64 => widen(bytes, f64::from_le_bytes),
        other => {
            return Err(LoadError::UnsupportedDtype {
                name: name.to_owned(),
                dtype: format!("{other:?}"),
            });
        }
    };
    Ok(values)
}

impl TensorMap {
    /// Decode a safetensors container. String metadata is kept alongside the
    /// tensors and is reachable through [`crate::TensorSource::text`].
    pub fn from_safetensors(bytes: &[u8]) -> Result<Self, LoadError> {
        let (_, metadata) = SafeTensors::read_metadata(bytes)?;
        let tensors = SafeTensors::deserialize(bytes)?;

        let mut map = Self::new();
        for (name, view) in tensors.tensors() {
            let values = decode_values(&name, view.dtype(), view.data())?;
            let tensor = TensorData::new(view.shape().to_vec(), values).map_err(|e| {
                LoadError::Shape {
                    name: name.clone(),
                    shape: e.shape,
                    expected: format!("{} values", e.expected),
                }
            })?;
            log::debug!("Loaded tensor '{name}' {:?} ({:?})", tensor.shape, view.dtype());
            map.insert(name, tensor);
        }
        if let Some(text) = metadata.metadata() {
            for (key, value) in text {
                map.insert_text(key.clone(), value.clone());
            }
        }
        Ok(map)
    }

    /// Encode every tensor as F64 into a safetensors container.
    pub fn to_safetensors(&self) -> Result<Vec<u8>, LoadError> {
        let encoded: Vec<_> = self
            .tensor_names()
            .filter_map(|name| self.get(name).map(|tensor| (name, tensor)))
            .map(|(name, tensor)| {
                let bytes: Vec<u8> = tensor.data.iter().flat_map(|v| v.to_le_bytes()).collect();
                (name, tensor.shape.clone(), bytes)
            })
            .collect();
        let views = encoded
            .iter()
            .map(|(name, shape, bytes)| {
                let view = TensorView::new(Dtype::F64, shape.clone(), bytes)?;
                Ok((*name, view))
            })
            .collect::<Result<Vec<_>, LoadError>>()?;

        let text: HashMap<String, String> = self
            .text_entries()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        let metadata = (!text.is_empty()).then_some(text);
        Ok(safetensors::serialize(views, metadata)?)
    }
}

pub fn load_safetensors(path: &Path) -> Result<TensorMap, LoadError> {
    let bytes = std::fs::read(path)?;
    log::info!("Read {} ({} bytes)", path.display(), bytes.len());
    TensorMap::from_safetensors(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TensorSource;

    fn raw_container(entries: &[(&str, Dtype, Vec<usize>, Vec<u8>)]) -> Vec<u8> {
        let views = entries.iter().map(|(name, dtype, shape, bytes)| {
            (*name, TensorView::new(*dtype, shape.clone(), bytes).unwrap())
        });
        safetensors::serialize(views, None).unwrap()
    }

    #[test]
    fn decodes_mixed_dtypes() {
        let floats: Vec<u8> = [1.5f32, -2.0, 0.25]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let longs: Vec<u8> = [-1i64, 0, 1].iter().flat_map(|v| v.to_le_bytes()).collect();
        let bytes = raw_container(&[
            ("position", Dtype::F32, vec![1, 3], floats),
            ("bone_parents", Dtype::I64, vec![3], longs),
        ]);

        let map = TensorMap::from_safetensors(&bytes).unwrap();
        let position = map.tensor("position").unwrap();
        assert_eq!(position.shape, vec![1, 3]);
        assert_eq!(position.data, vec![1.5, -2.0, 0.25]);
        assert_eq!(map.tensor("bone_parents").unwrap().to_i32_vec(), vec![-1, 0, 1]);
    }

    #[test]
    fn widens_half_precision() {
        let halves: Vec<u8> = [1.0f32, 0.5, -2.0]
            .iter()
            .flat_map(|&v| f16::from_f32(v).to_le_bytes())
            .collect();
        let brains: Vec<u8> = [0.25f32, 1.0]
            .iter()
            .flat_map(|&v| bf16::from_f32(v).to_le_bytes())
            .collect();
        let bytes = raw_container(&[
            ("opacity", Dtype::F16, vec![3], halves),
            ("color", Dtype::BF16, vec![1, 2], brains),
        ]);

        let map = TensorMap::from_safetensors(&bytes).unwrap();
        assert_eq!(map.tensor("opacity").unwrap().data, vec![1.0, 0.5, -2.0]);
        assert_eq!(map.tensor("color").unwrap().data, vec![0.25, 1.0]);
    }

    #[test]
    fn rejects_eight_bit_floats() {
        let bytes = raw_container(&[("opacity", Dtype::F8_E4M3, vec![2], vec![0, 0])]);
        assert!(matches!(
            TensorMap::from_safetensors(&bytes),
            Err(LoadError::UnsupportedDtype { dtype, .. }) if dtype == "F8_E4M3"
        ));
    }

    #[test]
    fn rejects_garbage() {
        assert!(TensorMap::from_safetensors(b"definitely not a container").is_err());
    }

    #[test]
    fn encoded_container_reads_back() {
        let mut map = TensorMap::new();
        map.insert(
            "opacity",
            TensorData::new(vec![3], vec![0.05, 0.5, 0.9]).unwrap(),
        );
        map.insert(
            "covariance",
            TensorData::new(vec![1, 3, 3], vec![1.0, 0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 3.0])
                .unwrap(),
        );
        map.insert_text("joint_names", r#"["root","spine"]"#);

        let decoded = TensorMap::from_safetensors(&map.to_safetensors().unwrap()).unwrap();
        assert_eq!(decoded.tensor("opacity"), map.tensor("opacity"));
        assert_eq!(decoded.tensor("covariance"), map.tensor("covariance"));
        assert_eq!(decoded.text("joint_names"), Some(r#"["root","spine"]"#));
    }
}
