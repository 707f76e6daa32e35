//! Error type for host side schedule execution.

use thiserror::Error;

use crate::errors::{KernelError, ShapeError};

/// Errors raised while running a schedule on the CPU.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InferenceError {
    #[error(transparent)]
    Shape(#[from] ShapeError),

    #[error("Step {step} failed: {source}")]
    Step {
        step: usize,
        #[source]
        source: KernelError,
    },
}
