//! Texture-based GPU tensor runtime for YOLO-family detectors.
//!
//! Every tensor lives in a single-channel 2D float texture and every
//! operation is a fragment-shader pass that renders one output texture from
//! up to N input textures. A model is a fixed, validated [`Schedule`] of
//! kernel steps; the [`gpu::Runtime`] allocates all textures and compiles
//! all programs once, then replays the steps for each inference.
//!
//! The [`CpuRunner`] executes the same schedule with the kernels' CPU
//! reference implementations and is the ground truth for GPU results.

pub mod activation;
pub mod config;
pub mod cpu_runner;
pub mod errors;
pub mod gpu;
pub mod kernels;
pub mod precision;
pub mod schedule;
pub mod schedule_info;
pub mod texture_layout;
pub mod weights;
pub mod yolo;

pub use activation::Activation;
pub use config::RuntimeConfig;
pub use cpu_runner::CpuRunner;
pub use precision::Precision;
pub use schedule::Schedule;
pub use schedule_info::{ScheduleInfo, ScheduleInfoBuilder};
pub use texture_layout::TextureLayout;
pub use yolo::YoloConfig;
