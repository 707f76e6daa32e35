//! Device and queue ownership.

use log::{info, warn};
use pollster::FutureExt;

use crate::config::RuntimeConfig;
use crate::gpu::errors::{GpuRuntimeError, GpuRuntimeResult};
use crate::gpu::tensor_store::{TENSOR_USAGES, texture_format};
use crate::precision::Precision;

/// The wgpu device and queue every GPU object of the runtime is created on.
#[derive(Debug)]
pub struct GpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_info: wgpu::AdapterInfo,
    max_texture_dimension: u32,
    max_sampled_textures: u32,
    supported_precisions: Vec<Precision>,
}

impl GpuContext {
    /// Selects an adapter and creates a device, blocking on the futures.
    pub fn new(config: &RuntimeConfig) -> GpuRuntimeResult<Self> {
        Self::new_async(config).block_on()
    }

    pub async fn new_async(config: &RuntimeConfig) -> GpuRuntimeResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: config.get_power_preference().into(),
                force_fallback_adapter: config.get_force_fallback_adapter(),
                compatible_surface: None,
            })
            .await
            .ok_or_else(|| GpuRuntimeError::DeviceNotAvailable {
                message: "no compatible adapter found".to_string(),
            })?;

        let adapter_info = adapter.get_info();
        let limits = adapter.limits();
        let supported_precisions: Vec<Precision> = [Precision::Full, Precision::Half]
            .into_iter()
            .filter(|&precision| {
                adapter
                    .get_texture_format_features(texture_format(precision))
                    .allowed_usages
                    .contains(TENSOR_USAGES)
            })
            .collect();
        for precision in [Precision::Full, Precision::Half] {
            if !supported_precisions.contains(&precision) {
                warn!(
                    "Adapter '{}' cannot render to {:?} textures, {:?} tensors are unavailable",
                    adapter_info.name,
                    texture_format(precision),
                    precision
                );
            }
        }

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some(config.get_label()),
                    required_features: wgpu::Features::empty(),
                    required_limits: limits.clone(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await?;

        let max_texture_dimension =
            config.get_max_texture_dimension(limits.max_texture_dimension_2d);
        info!(
            "Using adapter '{}' ({:?}, {:?}), max texture dimension {}",
            adapter_info.name, adapter_info.backend, adapter_info.device_type, max_texture_dimension
        );

        Ok(Self {
            device,
            queue,
            adapter_info,
            max_texture_dimension,
            max_sampled_textures: limits.max_sampled_textures_per_shader_stage,
            supported_precisions,
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    /// Texture side cap used for tensor layouts.
    pub fn max_texture_dimension(&self) -> u32 {
        self.max_texture_dimension
    }

    /// Most input textures a single program may bind.
    pub fn max_sampled_textures(&self) -> u32 {
        self.max_sampled_textures
    }

    /// Whether tensors of `precision` can be allocated and rendered to.
    pub fn supports_precision(&self, precision: Precision) -> bool {
        self.supported_precisions.contains(&precision)
    }

    /// Blocks until all submitted work has completed.
    pub fn wait_idle(&self) {
        let _ = self.device.poll(wgpu::Maintain::Wait);
    }

    /// Runs `f` inside a validation error scope and returns the first error.
    pub(crate) fn validation_scope<T>(&self, f: impl FnOnce() -> T) -> (T, Option<wgpu::Error>) {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f();
        let error = self.device.pop_error_scope().block_on();
        (value, error)
    }
}
