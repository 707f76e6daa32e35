//! Error types for the serialized weight file.

use thiserror::Error;

use crate::errors::ShapeError;

/// Errors that can occur while decoding a weight file or resolving tensors from it.
#[derive(Error, Debug)]
pub enum WeightFileError {
    #[error("Weight file is too short to contain a header length: {size} bytes")]
    HeaderTooShort { size: usize },

    #[error("Header length {header_len} exceeds the file size {file_size}")]
    HeaderOutOfBounds { header_len: u64, file_size: usize },

    #[error("Header is not valid UTF-8")]
    HeaderNotUtf8,

    #[error("Header is not valid JSON: {0}")]
    InvalidHeader(#[from] serde_json::Error),

    #[error("Tensor '{name}' has an inverted data range [{start}, {end})")]
    InvertedRange {
        name: String,
        start: usize,
        end: usize,
    },

    #[error("Tensor '{name}' data range [{start}, {end}) exceeds the payload size {payload_size}")]
    RangeOutOfBounds {
        name: String,
        start: usize,
        end: usize,
        payload_size: usize,
    },

    #[error(
        "Tensor '{name}' byte length {byte_len} does not match shape {shape:?} with dtype {dtype}"
    )]
    ByteLengthMismatch {
        name: String,
        dtype: String,
        shape: Vec<usize>,
        byte_len: usize,
    },

    #[error("Tensor '{name}' has a shape whose size overflows")]
    ShapeOverflow { name: String },

    #[error("Tensor '{name}' uses unsupported dtype {dtype}")]
    UnsupportedDtype { name: String, dtype: String },

    #[error("Tensor '{name}' is not present in the weight file")]
    MissingTensor { name: String },

    #[error(transparent)]
    Shape(#[from] ShapeError),

    #[error("Failed to read weight file: {0}")]
    Io(#[from] std::io::Error),
}
