//! Error types for kernel template construction and CPU reference execution.

use thiserror::Error;

/// Errors that can occur when a kernel template is configured or applied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    #[error("The {dimension} of a {kernel} kernel must be greater than 0")]
    ZeroDimension {
        kernel: String,
        dimension: String,
    },

    #[error("The {parameter} of a {kernel} kernel must be finite and {bound}, got {value}")]
    InvalidParameter {
        kernel: String,
        parameter: String,
        bound: String,
        value: String,
    },

    #[error("Padding {padding} is too large for a window of {window} on a {kernel} kernel")]
    PaddingTooLarge {
        kernel: String,
        padding: usize,
        window: usize,
    },

    #[error("The {kernel} kernel produces an empty {height}x{width} output")]
    EmptyOutput {
        kernel: String,
        height: usize,
        width: usize,
    },

    #[error(
        "Slice [{offset}, {offset}+{length}) is outside of a source of length {source_length}"
    )]
    SliceOutOfBounds {
        offset: usize,
        length: usize,
        source_length: usize,
    },

    #[error("A concat kernel needs at least one input")]
    EmptyConcat,

    #[error("Box decoding needs at least one detection level")]
    NoDetectionLevels,

    #[error("The {kernel} kernel expects {expected} inputs but got {actual}")]
    InputCountMismatch {
        kernel: String,
        expected: usize,
        actual: usize,
    },

    #[error("Input {index} of the {kernel} kernel has length {actual}, expected {expected}")]
    InputLengthMismatch {
        kernel: String,
        index: usize,
        expected: usize,
        actual: usize,
    },

    #[error("The output of the {kernel} kernel has length {actual}, expected {expected}")]
    OutputLengthMismatch {
        kernel: String,
        expected: usize,
        actual: usize,
    },
}
