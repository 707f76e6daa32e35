//! Compiled kernel programs.

use log::debug;

use crate::gpu::context::GpuContext;
use crate::gpu::errors::{GpuRuntimeError, GpuRuntimeResult};
use crate::gpu::shaders::{FIRST_INPUT_BINDING, FRAGMENT_ENTRY, VERTEX_ENTRY, get_program_wgsl};
use crate::gpu::tensor_store::texture_format;
use crate::precision::Precision;

/// A render pipeline computing one output tensor from `input_count` input
/// textures.
#[derive(Debug)]
pub struct KernelProgram {
    name: String,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    input_count: usize,
    precision: Precision,
}

impl KernelProgram {
    /// Compiles the program for a render target of the given precision.
    ///
    /// Shader and pipeline validation errors are returned as
    /// [`GpuRuntimeError::ShaderCompilationFailed`].
    pub fn compile(
        ctx: &GpuContext,
        name: &str,
        compute: &str,
        input_count: usize,
        precision: Precision,
    ) -> GpuRuntimeResult<Self> {
        if input_count > ctx.max_sampled_textures() as usize {
            return Err(GpuRuntimeError::TooManyInputs {
                program: name.to_string(),
                count: input_count,
                max: ctx.max_sampled_textures(),
            });
        }

        let source = get_program_wgsl(compute, input_count);
        let device = ctx.device();

        let (built, error) = ctx.validation_scope(|| {
            let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(name),
                source: wgpu::ShaderSource::Wgsl(source.as_str().into()),
            });

            let mut entries = vec![wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }];
            for k in 0..input_count {
                entries.push(wgpu::BindGroupLayoutEntry {
                    binding: FIRST_INPUT_BINDING + k as u32,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                });
            }
            let bind_group_layout =
                device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some(name),
                    entries: &entries,
                });

            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(name),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

            let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(name),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &module,
                    entry_point: Some(VERTEX_ENTRY),
                    compilation_options: Default::default(),
                    buffers: &[],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &module,
                    entry_point: Some(FRAGMENT_ENTRY),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: texture_format(precision),
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleStrip,
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            });
            (pipeline, bind_group_layout)
        });

        if let Some(error) = error {
            return Err(GpuRuntimeError::ShaderCompilationFailed {
                program: name.to_string(),
                message: error.to_string(),
            });
        }
        let (pipeline, bind_group_layout) = built;
        debug!("Compiled program '{}' with {} inputs", name, input_count);

        Ok(Self {
            name: name.to_string(),
            pipeline,
            bind_group_layout,
            input_count,
            precision,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pipeline(&self) -> &wgpu::RenderPipeline {
        &self.pipeline
    }

    pub fn bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_group_layout
    }

    pub fn input_count(&self) -> usize {
        self.input_count
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }
}
