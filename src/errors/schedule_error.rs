//! Error types for schedule validation.

use thiserror::Error;

use crate::errors::KernelError;

/// Errors that can occur while validating a schedule description.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("At least one step is required")]
    NoStepsProvided,

    #[error("At least one tensor is required")]
    NoTensorsProvided,

    #[error("The {label} tensor index {index} must be within the {count} declared tensors")]
    TensorIndexOutOfBounds {
        label: String,
        index: usize,
        count: usize,
    },

    #[error("Tensor '{name}' must have a length greater than 0")]
    EmptyTensor { name: String },

    #[error("Step {step} reads its own output tensor {tensor}")]
    SelfReadingStep { step: usize, tensor: usize },

    #[error("Step {step} reads tensor '{name}' before any step writes it")]
    ReadBeforeWrite { step: usize, name: String },

    #[error("Step {step} writes into weight tensor '{name}'")]
    WritesWeight { step: usize, name: String },

    #[error("Step {step} writes into the input tensor")]
    WritesInput { step: usize },

    #[error("The input tensor '{name}' cannot be initialized from a weight")]
    InputIsWeight { name: String },

    #[error("The output tensor '{name}' is never written by a step")]
    OutputNeverWritten { name: String },

    #[error("Step {step} ({kernel}) expects {expected} inputs but lists {actual}")]
    InputCountMismatch {
        step: usize,
        kernel: String,
        expected: usize,
        actual: usize,
    },

    #[error(
        "Step {step} ({kernel}) input {position} is tensor '{name}' of length {actual}, expected {expected}"
    )]
    InputLengthMismatch {
        step: usize,
        kernel: String,
        position: usize,
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error(
        "Step {step} ({kernel}) writes tensor '{name}' of length {actual}, expected {expected}"
    )]
    OutputLengthMismatch {
        step: usize,
        kernel: String,
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("Step {step} has an invalid kernel: {source}")]
    InvalidKernel {
        step: usize,
        #[source]
        source: KernelError,
    },
}
