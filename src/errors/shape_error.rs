//! Error types for tensor shape checks.

use thiserror::Error;

/// Errors raised when host data does not match the logical size of a tensor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    #[error("Tensor '{tensor}' expects {expected} elements but {actual} were provided")]
    LengthMismatch {
        tensor: String,
        expected: usize,
        actual: usize,
    },

    #[error("Tensor '{tensor}' must hold at least one element")]
    EmptyTensor { tensor: String },

    #[error("Byte input of {bytes} bytes is not a whole number of f32 values")]
    MisalignedBytes { bytes: usize },
}
