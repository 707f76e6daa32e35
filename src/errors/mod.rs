//! Error types for the texture runtime library.
//!
//! Each concern gets its own error enum, avoiding generic error wrappers like
//! `anyhow` or `Box<dyn Error>` for better error handling and debugging.
//! GPU specific errors live in [`crate::gpu::errors`].

mod inference_error;
mod kernel_error;
mod model_config_error;
mod schedule_error;
mod shape_error;
mod weight_file_error;

pub use inference_error::InferenceError;
pub use kernel_error::KernelError;
pub use model_config_error::ModelConfigError;
pub use schedule_error::ScheduleError;
pub use shape_error::ShapeError;
pub use weight_file_error::WeightFileError;

/// Result type alias for CPU schedule execution.
pub type InferenceResult<T> = std::result::Result<T, InferenceError>;

/// Result type alias for kernel template operations.
pub type KernelResult<T> = std::result::Result<T, KernelError>;

/// Result type alias for detector graph generation.
pub type ModelConfigResult<T> = std::result::Result<T, ModelConfigError>;

/// Result type alias for schedule validation.
pub type ScheduleResult<T> = std::result::Result<T, ScheduleError>;

/// Result type alias for weight file operations.
pub type WeightFileResult<T> = std::result::Result<T, WeightFileError>;
