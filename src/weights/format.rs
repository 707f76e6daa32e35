//! Low level decoding of the weight file layout.
//!
//! ```text
//! [ u64 little-endian header length ][ JSON header ][ payload bytes ... ]
//! ```
//!
//! The header maps tensor names to their dtype, shape and `data_offsets`,
//! which are relative to the start of the payload.

use std::collections::{BTreeMap, HashMap};

use half::{bf16, f16};
use serde::{Deserialize, Serialize};

use crate::errors::{WeightFileError, WeightFileResult};

/// Size of the little-endian header length prefix.
pub const HEADER_PREFIX_SIZE: usize = 8;

/// Reserved header key holding free-form string metadata.
pub const METADATA_KEY: &str = "__metadata__";

/// Element type of a stored tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Dtype {
    Bool,
    U8,
    I8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    #[serde(rename = "F8_E4M3")]
    F8E4M3,
    #[serde(rename = "F8_E5M2")]
    F8E5M2,
    F16,
    BF16,
    F32,
    F64,
}

impl Dtype {
    /// Bytes per element.
    pub fn size(self) -> usize {
        match self {
            Dtype::Bool | Dtype::U8 | Dtype::I8 | Dtype::F8E4M3 | Dtype::F8E5M2 => 1,
            Dtype::I16 | Dtype::U16 | Dtype::F16 | Dtype::BF16 => 2,
            Dtype::I32 | Dtype::U32 | Dtype::F32 => 4,
            Dtype::I64 | Dtype::U64 | Dtype::F64 => 8,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Dtype::Bool => "BOOL",
            Dtype::U8 => "U8",
            Dtype::I8 => "I8",
            Dtype::I16 => "I16",
            Dtype::U16 => "U16",
            Dtype::I32 => "I32",
            Dtype::U32 => "U32",
            Dtype::I64 => "I64",
            Dtype::U64 => "U64",
            Dtype::F8E4M3 => "F8_E4M3",
            Dtype::F8E5M2 => "F8_E5M2",
            Dtype::F16 => "F16",
            Dtype::BF16 => "BF16",
            Dtype::F32 => "F32",
            Dtype::F64 => "F64",
        }
    }
}

/// Header entry describing one stored tensor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorMetadata {
    pub dtype: Dtype,
    pub shape: Vec<usize>,
    /// `[start, end)` byte range relative to the payload start.
    pub data_offsets: [usize; 2],
}

impl TensorMetadata {
    /// Number of logical elements described by the shape, `None` on overflow.
    pub fn element_count(&self) -> Option<usize> {
        self.shape
            .iter()
            .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
    }

    /// Number of payload bytes covered by `data_offsets`.
    pub fn byte_len(&self) -> usize {
        self.data_offsets[1].saturating_sub(self.data_offsets[0])
    }
}

/// Decoded header of a weight file.
#[derive(Debug, Clone, Default)]
pub struct WeightHeader {
    /// Length in bytes of the JSON header.
    pub header_len: usize,
    pub tensors: BTreeMap<String, TensorMetadata>,
    pub metadata: Option<HashMap<String, String>>,
}

impl WeightHeader {
    /// Absolute offset of the payload in the file.
    pub fn payload_offset(&self) -> usize {
        HEADER_PREFIX_SIZE + self.header_len
    }
}

/// Parses and validates the header of `buffer`.
pub fn get_tensor_metadata(buffer: &[u8]) -> WeightFileResult<WeightHeader> {
    if buffer.len() < HEADER_PREFIX_SIZE {
        return Err(WeightFileError::HeaderTooShort { size: buffer.len() });
    }

    let mut prefix = [0u8; HEADER_PREFIX_SIZE];
    prefix.copy_from_slice(&buffer[..HEADER_PREFIX_SIZE]);
    let header_len = u64::from_le_bytes(prefix);

    let available = (buffer.len() - HEADER_PREFIX_SIZE) as u64;
    if header_len > available {
        return Err(WeightFileError::HeaderOutOfBounds {
            header_len,
            file_size: buffer.len(),
        });
    }
    let header_len = header_len as usize;

    let header_bytes = &buffer[HEADER_PREFIX_SIZE..HEADER_PREFIX_SIZE + header_len];
    let header_str =
        std::str::from_utf8(header_bytes).map_err(|_| WeightFileError::HeaderNotUtf8)?;
    let raw: BTreeMap<String, serde_json::Value> = serde_json::from_str(header_str)?;

    let payload_size = buffer.len() - HEADER_PREFIX_SIZE - header_len;
    let mut tensors = BTreeMap::new();
    let mut metadata = None;

    for (name, value) in raw {
        if name == METADATA_KEY {
            metadata = Some(serde_json::from_value(value)?);
            continue;
        }
        let meta: TensorMetadata = serde_json::from_value(value)?;
        validate_entry(&name, &meta, payload_size)?;
        tensors.insert(name, meta);
    }

    Ok(WeightHeader {
        header_len,
        tensors,
        metadata,
    })
}

fn validate_entry(name: &str, meta: &TensorMetadata, payload_size: usize) -> WeightFileResult<()> {
    let [start, end] = meta.data_offsets;
    if start > end {
        return Err(WeightFileError::InvertedRange {
            name: name.to_string(),
            start,
            end,
        });
    }
    if end > payload_size {
        return Err(WeightFileError::RangeOutOfBounds {
            name: name.to_string(),
            start,
            end,
            payload_size,
        });
    }
    let expected = meta
        .element_count()
        .and_then(|count| count.checked_mul(meta.dtype.size()))
        .ok_or_else(|| WeightFileError::ShapeOverflow {
            name: name.to_string(),
        })?;
    if meta.byte_len() != expected {
        return Err(WeightFileError::ByteLengthMismatch {
            name: name.to_string(),
            dtype: meta.dtype.name().to_string(),
            shape: meta.shape.clone(),
            byte_len: meta.byte_len(),
        });
    }
    Ok(())
}

/// Slices the bytes of one tensor out of the full file buffer.
pub fn get_tensor_buffer<'a>(
    buffer: &'a [u8],
    header: &WeightHeader,
    meta: &TensorMetadata,
) -> &'a [u8] {
    let base = header.payload_offset();
    &buffer[base + meta.data_offsets[0]..base + meta.data_offsets[1]]
}

/// Decodes raw tensor bytes into `f32` values.
pub fn decode_f32(name: &str, dtype: Dtype, bytes: &[u8]) -> WeightFileResult<Vec<f32>> {
    let values = match dtype {
        Dtype::F32 => bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
        Dtype::F16 => bytes
            .chunks_exact(2)
            .map(|c| f16::from_le_bytes([c[0], c[1]]).to_f32())
            .collect(),
        Dtype::BF16 => bytes
            .chunks_exact(2)
            .map(|c| bf16::from_le_bytes([c[0], c[1]]).to_f32())
            .collect(),
        other => {
            return Err(WeightFileError::UnsupportedDtype {
                name: name.to_string(),
                dtype: other.name().to_string(),
            });
        }
    };
    Ok(values)
}
