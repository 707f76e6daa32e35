//! Error types for detector graph generation.

use thiserror::Error;

use crate::errors::KernelError;

/// Errors raised while generating a detector schedule.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelConfigError {
    #[error("Unknown model variant '{name}', expected one of n, s, m, l, x")]
    UnknownVariant { name: String },

    #[error("Input size {height}x{width} must be a positive multiple of {stride}")]
    UnalignedInput {
        height: usize,
        width: usize,
        stride: usize,
    },

    #[error("The model needs at least one class")]
    NoClasses,

    #[error(transparent)]
    Kernel(#[from] KernelError),
}
