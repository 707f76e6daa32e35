//! GPU execution of tensor schedules.
//!
//! Tensors live in single-channel 2D textures and every step of a schedule
//! is a fragment-shader pass rendering into its output texture.
//!
//! # Architecture
//!
//! - [`tensor_store`] allocates tensor textures and moves data in and out.
//! - [`program`] compiles a kernel's generated code into a render pipeline.
//! - [`dispatcher`] records one step as a render pass.
//! - [`runtime`] owns all of the above for one schedule and runs inference.
//!
//! # Usage
//!
//! ```ignore
//! use texmodel_inference::config::RuntimeConfig;
//! use texmodel_inference::gpu::{GpuContext, Runtime};
//! use texmodel_inference::schedule::Schedule;
//! use texmodel_inference::schedule_info::ScheduleInfo;
//! use texmodel_inference::weights::{ResolvedWeights, WeightFile};
//!
//! let config = RuntimeConfig::from_env();
//! let schedule = Schedule::new(ScheduleInfo::from_json(&json)?)?;
//! let weights = ResolvedWeights::resolve(&WeightFile::open("model.safetensors")?, &schedule)?;
//! let mut runtime = Runtime::new(GpuContext::new(&config)?, schedule, &weights, &config)?;
//! let output = runtime.infer(&input)?;
//! ```

pub mod context;
pub mod dispatcher;
pub mod errors;
pub mod program;
pub mod runtime;
pub mod shaders;
pub mod tensor_store;

pub use context::GpuContext;
pub use dispatcher::{Dispatcher, StepBinding};
pub use errors::{GpuRuntimeError, GpuRuntimeResult};
pub use program::KernelProgram;
pub use runtime::Runtime;
pub use tensor_store::{GpuTensor, create_tensor, read_tensor, write_tensor};
