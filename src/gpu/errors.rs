//! GPU-specific error types for the texture runtime.

use thiserror::Error;

use crate::errors::{ScheduleError, ShapeError, WeightFileError};
use crate::precision::Precision;

/// Errors raised by the device, the tensor store and the runtime.
#[derive(Error, Debug)]
pub enum GpuRuntimeError {
    #[error("GPU device not available: {message}")]
    DeviceNotAvailable { message: String },

    #[error("Failed to create GPU device: {0}")]
    DeviceRequestFailed(#[from] wgpu::RequestDeviceError),

    #[error(
        "Tensor '{tensor}' of {length} elements needs a {width}x{height} texture, above the {max_dimension} texel limit"
    )]
    TextureTooLarge {
        tensor: String,
        length: usize,
        width: usize,
        height: usize,
        max_dimension: u32,
    },

    #[error("Tensor '{tensor}' uses {precision:?} precision, whose texture format the adapter cannot render to")]
    UnsupportedPrecision {
        tensor: String,
        precision: Precision,
    },

    #[error("Allocation of tensor '{tensor}' failed: {message}")]
    AllocationFailed { tensor: String, message: String },

    #[error("Program '{program}' binds {count} input textures, the device allows {max}")]
    TooManyInputs {
        program: String,
        count: usize,
        max: u32,
    },

    #[error("Shader compilation failed for '{program}': {message}")]
    ShaderCompilationFailed { program: String, message: String },

    #[error("Dispatch failed: {message}")]
    DispatchFailed { message: String },

    #[error("Readback of tensor '{tensor}' failed: {message}")]
    ReadbackFailed { tensor: String, message: String },

    #[error("Tensor index {index} must be within the {count} runtime tensors")]
    TensorIndexOutOfBounds { index: usize, count: usize },

    #[error("No weight data was resolved for tensor '{tensor}'")]
    MissingWeight { tensor: String },

    #[error(transparent)]
    Shape(#[from] ShapeError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    WeightFile(#[from] WeightFileError),
}

pub type GpuRuntimeResult<T> = std::result::Result<T, GpuRuntimeError>;
