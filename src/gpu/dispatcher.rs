//! Recording of kernel steps into render passes.

use bytemuck::{Pod, Zeroable};
use log::trace;
use wgpu::util::DeviceExt;

use crate::gpu::context::GpuContext;
use crate::gpu::program::KernelProgram;
use crate::gpu::shaders::{FIRST_INPUT_BINDING, QUAD_VERTEX_COUNT};
use crate::gpu::tensor_store::GpuTensor;

/// Uniform block of every program. Padded to 16 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct Params {
    width: u32,
    _padding: [u32; 3],
}

/// Resources of one step, built once when the runtime is created.
///
/// `output` and `inputs` are tensor indices; the inputs are bound as
/// `data1..dataK` in order.
#[derive(Debug)]
pub struct StepBinding {
    pub program_index: usize,
    pub output: usize,
    pub inputs: Vec<usize>,
    bind_group: wgpu::BindGroup,
    _params: wgpu::Buffer,
}

impl StepBinding {
    pub fn new(
        ctx: &GpuContext,
        program_index: usize,
        program: &KernelProgram,
        output: (usize, &GpuTensor),
        inputs: &[(usize, &GpuTensor)],
    ) -> Self {
        let (output_index, output_tensor) = output;
        let params = Params {
            width: output_tensor.layout().width() as u32,
            _padding: [0; 3],
        };
        let params_buffer = ctx
            .device()
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(output_tensor.label()),
                contents: bytemuck::bytes_of(&params),
                usage: wgpu::BufferUsages::UNIFORM,
            });

        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: params_buffer.as_entire_binding(),
        }];
        for (k, (_, tensor)) in inputs.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: FIRST_INPUT_BINDING + k as u32,
                resource: wgpu::BindingResource::TextureView(tensor.view()),
            });
        }
        let bind_group = ctx.device().create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(output_tensor.label()),
            layout: program.bind_group_layout(),
            entries: &entries,
        });

        Self {
            program_index,
            output: output_index,
            inputs: inputs.iter().map(|(index, _)| *index).collect(),
            bind_group,
            _params: params_buffer,
        }
    }
}

/// Records steps into a command encoder.
pub struct Dispatcher;

impl Dispatcher {
    /// Records one step: a render pass targeting `output` that draws the
    /// program's quad over the whole texture.
    pub fn run(
        encoder: &mut wgpu::CommandEncoder,
        program: &KernelProgram,
        binding: &StepBinding,
        output: &GpuTensor,
    ) {
        let layout = output.layout();
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(output.label()),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: output.view(),
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_viewport(
            0.0,
            0.0,
            layout.width() as f32,
            layout.height() as f32,
            0.0,
            1.0,
        );
        pass.set_pipeline(program.pipeline());
        pass.set_bind_group(0, &binding.bind_group, &[]);
        pass.draw(0..QUAD_VERTEX_COUNT, 0..1);
        trace!(
            "Recorded '{}' -> '{}' ({}x{})",
            program.name(),
            output.label(),
            layout.width(),
            layout.height()
        );
    }
}
