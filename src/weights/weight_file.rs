//! Owned weight file with name based tensor lookup.

use std::path::Path;

use log::debug;

use crate::errors::{WeightFileError, WeightFileResult};
use crate::weights::format::{
    Dtype, TensorMetadata, WeightHeader, decode_f32, get_tensor_buffer, get_tensor_metadata,
};

/// A borrowed view of one stored tensor.
#[derive(Debug, Clone, Copy)]
pub struct WeightView<'a> {
    pub name: &'a str,
    pub dtype: Dtype,
    pub shape: &'a [usize],
    pub bytes: &'a [u8],
}

impl WeightView<'_> {
    /// Number of logical elements.
    pub fn element_count(&self) -> usize {
        self.shape.iter().product()
    }

    /// Decodes the stored values into `f32`.
    pub fn to_f32_vec(&self) -> WeightFileResult<Vec<f32>> {
        decode_f32(self.name, self.dtype, self.bytes)
    }
}

/// A weight file loaded into host memory.
#[derive(Debug, Clone)]
pub struct WeightFile {
    buffer: Vec<u8>,
    header: WeightHeader,
}

impl WeightFile {
    /// Parses an in-memory weight file.
    pub fn from_bytes(buffer: Vec<u8>) -> WeightFileResult<Self> {
        let header = get_tensor_metadata(&buffer)?;
        debug!(
            "Loaded weight header: {} tensors, {} header bytes, {} total bytes",
            header.tensors.len(),
            header.header_len,
            buffer.len()
        );
        Ok(Self { buffer, header })
    }

    /// Reads and parses a weight file from disk.
    pub fn open(path: impl AsRef<Path>) -> WeightFileResult<Self> {
        let buffer = std::fs::read(path.as_ref())?;
        Self::from_bytes(buffer)
    }

    /// Returns the decoded header.
    pub fn header(&self) -> &WeightHeader {
        &self.header
    }

    /// Returns the metadata of a tensor by name.
    pub fn metadata(&self, name: &str) -> Option<&TensorMetadata> {
        self.header.tensors.get(name)
    }

    /// Iterates over the stored tensor names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.header.tensors.keys().map(String::as_str)
    }

    /// Returns a view of a tensor by name.
    pub fn tensor(&self, name: &str) -> WeightFileResult<WeightView<'_>> {
        let (key, meta) = self.header.tensors.get_key_value(name).ok_or_else(|| {
            WeightFileError::MissingTensor {
                name: name.to_string(),
            }
        })?;
        Ok(WeightView {
            name: key.as_str(),
            dtype: meta.dtype,
            shape: &meta.shape,
            bytes: get_tensor_buffer(&self.buffer, &self.header, meta),
        })
    }

    /// Number of stored tensors.
    pub fn len(&self) -> usize {
        self.header.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.header.tensors.is_empty()
    }
}
