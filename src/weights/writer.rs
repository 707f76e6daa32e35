//! Serialization of named tensors into the weight file layout.

use std::collections::BTreeMap;
use std::path::Path;

use half::f16;

use crate::errors::{ShapeError, WeightFileResult};
use crate::weights::format::{Dtype, HEADER_PREFIX_SIZE, TensorMetadata};

struct PendingTensor {
    name: String,
    dtype: Dtype,
    shape: Vec<usize>,
    bytes: Vec<u8>,
}

/// Builds a weight file from host tensors.
///
/// Tensors are stored in insertion order; the JSON header is padded with
/// spaces so the payload starts on an 8-byte boundary.
#[derive(Default)]
pub struct WeightWriter {
    tensors: Vec<PendingTensor>,
    metadata: Option<BTreeMap<String, String>>,
}

impl WeightWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a free-form string entry to the `__metadata__` header key.
    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.to_string());
        self
    }

    /// Adds an `F32` tensor.
    pub fn add_f32(&mut self, name: &str, shape: &[usize], values: &[f32]) -> WeightFileResult<()> {
        Self::check_len(name, shape, values.len())?;
        let bytes = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.push(name, Dtype::F32, shape, bytes);
        Ok(())
    }

    /// Adds an `F16` tensor, rounding the given values.
    pub fn add_f16(&mut self, name: &str, shape: &[usize], values: &[f32]) -> WeightFileResult<()> {
        Self::check_len(name, shape, values.len())?;
        let bytes = values
            .iter()
            .flat_map(|&v| f16::from_f32(v).to_le_bytes())
            .collect();
        self.push(name, Dtype::F16, shape, bytes);
        Ok(())
    }

    /// Adds an all-zero tensor of the given dtype.
    pub fn add_zeros(&mut self, name: &str, dtype: Dtype, shape: &[usize]) {
        let len: usize = shape.iter().product();
        self.push(name, dtype, shape, vec![0u8; len * dtype.size()]);
    }

    fn check_len(name: &str, shape: &[usize], actual: usize) -> WeightFileResult<()> {
        let expected: usize = shape.iter().product();
        if expected != actual {
            return Err(ShapeError::LengthMismatch {
                tensor: name.to_string(),
                expected,
                actual,
            }
            .into());
        }
        Ok(())
    }

    fn push(&mut self, name: &str, dtype: Dtype, shape: &[usize], bytes: Vec<u8>) {
        self.tensors.push(PendingTensor {
            name: name.to_string(),
            dtype,
            shape: shape.to_vec(),
            bytes,
        });
    }

    /// Serializes all added tensors.
    pub fn to_bytes(&self) -> WeightFileResult<Vec<u8>> {
        let mut header = serde_json::Map::new();
        if let Some(metadata) = &self.metadata {
            header.insert("__metadata__".to_string(), serde_json::to_value(metadata)?);
        }

        let mut offset = 0;
        for tensor in &self.tensors {
            let meta = TensorMetadata {
                dtype: tensor.dtype,
                shape: tensor.shape.clone(),
                data_offsets: [offset, offset + tensor.bytes.len()],
            };
            header.insert(tensor.name.clone(), serde_json::to_value(meta)?);
            offset += tensor.bytes.len();
        }

        let mut header_bytes = serde_json::to_vec(&header)?;
        while (HEADER_PREFIX_SIZE + header_bytes.len()) % 8 != 0 {
            header_bytes.push(b' ');
        }

        let mut out = Vec::with_capacity(HEADER_PREFIX_SIZE + header_bytes.len() + offset);
        out.extend_from_slice(&(header_bytes.len() as u64).to_le_bytes());
        out.extend_from_slice(&header_bytes);
        for tensor in &self.tensors {
            out.extend_from_slice(&tensor.bytes);
        }
        Ok(out)
    }

    /// Serializes all added tensors into a file.
    pub fn write_to(&self, path: impl AsRef<Path>) -> WeightFileResult<()> {
        std::fs::write(path, self.to_bytes()?)?;
        Ok(())
    }
}
