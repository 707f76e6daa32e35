//! Graph runner executing a schedule on the GPU.

use std::time::Instant;

use log::{debug, info};

use crate::config::RuntimeConfig;
use crate::errors::ShapeError;
use crate::gpu::context::GpuContext;
use crate::gpu::dispatcher::{Dispatcher, StepBinding};
use crate::gpu::errors::{GpuRuntimeError, GpuRuntimeResult};
use crate::gpu::program::KernelProgram;
use crate::gpu::tensor_store::{GpuTensor, create_tensor, read_tensor, write_tensor};
use crate::schedule::Schedule;
use crate::texture_layout::TextureLayout;
use crate::weights::ResolvedWeights;

/// Owns every GPU resource of one compiled schedule.
///
/// Tensors are allocated and weights uploaded once in [`Runtime::new`];
/// each [`Runtime::infer`] only overwrites the input tensor, replays the
/// recorded steps and reads the output back. `infer` takes `&mut self`, so
/// one instance never has two inferences in flight.
pub struct Runtime {
    ctx: GpuContext,
    schedule: Schedule,
    tensors: Vec<GpuTensor>,
    programs: Vec<KernelProgram>,
    bindings: Vec<StepBinding>,
    label: String,
}

impl Runtime {
    pub fn new(
        ctx: GpuContext,
        schedule: Schedule,
        weights: &ResolvedWeights,
        config: &RuntimeConfig,
    ) -> GpuRuntimeResult<Self> {
        let start = Instant::now();

        let mut tensors = Vec::with_capacity(schedule.tensors().len());
        for (index, info) in schedule.tensors().iter().enumerate() {
            let initial = match &info.weight {
                Some(_) => Some(weights.get(index).ok_or_else(|| {
                    GpuRuntimeError::MissingWeight {
                        tensor: info.name.clone(),
                    }
                })?),
                None => None,
            };
            tensors.push(create_tensor(
                &ctx,
                &info.name,
                info.length,
                info.precision,
                initial,
            )?);
        }

        let mut programs = Vec::with_capacity(schedule.programs().len());
        for source in schedule.programs() {
            programs.push(KernelProgram::compile(
                &ctx,
                &source.name,
                &source.compute,
                source.input_count,
                source.precision,
            )?);
        }

        let (bindings, error) = ctx.validation_scope(|| {
            schedule
                .steps()
                .iter()
                .map(|step| {
                    let inputs: Vec<(usize, &GpuTensor)> =
                        step.inputs.iter().map(|&i| (i, &tensors[i])).collect();
                    StepBinding::new(
                        &ctx,
                        step.program_index,
                        &programs[step.program_index],
                        (step.output, &tensors[step.output]),
                        &inputs,
                    )
                })
                .collect::<Vec<_>>()
        });
        if let Some(error) = error {
            return Err(GpuRuntimeError::DispatchFailed {
                message: error.to_string(),
            });
        }
        ctx.wait_idle();

        info!(
            "Runtime '{}' ready: {} tensors, {} steps, {} programs in {:?}",
            config.get_label(),
            tensors.len(),
            bindings.len(),
            programs.len(),
            start.elapsed()
        );

        Ok(Self {
            ctx,
            schedule,
            tensors,
            programs,
            bindings,
            label: config.get_label().to_string(),
        })
    }

    /// Runs the whole schedule on `input` and returns the output tensor.
    pub fn infer(&mut self, input: &[f32]) -> GpuRuntimeResult<Vec<f32>> {
        let input_tensor = &self.tensors[self.schedule.input()];
        if input.len() != input_tensor.len() {
            return Err(ShapeError::LengthMismatch {
                tensor: input_tensor.label().to_string(),
                expected: input_tensor.len(),
                actual: input.len(),
            }
            .into());
        }
        let start = Instant::now();
        write_tensor(&self.ctx, input_tensor, input)?;

        let ((), error) = self.ctx.validation_scope(|| {
            let mut encoder =
                self.ctx
                    .device()
                    .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                        label: Some(&self.label),
                    });
            for binding in &self.bindings {
                Dispatcher::run(
                    &mut encoder,
                    &self.programs[binding.program_index],
                    binding,
                    &self.tensors[binding.output],
                );
            }
            self.ctx.queue().submit(Some(encoder.finish()));
        });
        if let Some(error) = error {
            return Err(GpuRuntimeError::DispatchFailed {
                message: error.to_string(),
            });
        }

        let output = read_tensor(&self.ctx, &self.tensors[self.schedule.output()])?;
        debug!(
            "Inference over {} steps finished in {:?}",
            self.bindings.len(),
            start.elapsed()
        );
        Ok(output)
    }

    /// Runs inference on little-endian `f32` bytes.
    pub fn infer_bytes(&mut self, bytes: &[u8]) -> GpuRuntimeResult<Vec<f32>> {
        if !bytes.len().is_multiple_of(4) {
            return Err(ShapeError::MisalignedBytes { bytes: bytes.len() }.into());
        }
        let input: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        self.infer(&input)
    }

    pub fn context(&self) -> &GpuContext {
        &self.ctx
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn input_len(&self) -> usize {
        self.schedule.input_len()
    }

    pub fn output_len(&self) -> usize {
        self.schedule.output_len()
    }

    pub fn step_count(&self) -> usize {
        self.bindings.len()
    }

    /// Number of unique compiled programs.
    pub fn program_count(&self) -> usize {
        self.programs.len()
    }

    pub fn tensor_layout(&self, index: usize) -> Option<TextureLayout> {
        self.tensors.get(index).map(GpuTensor::layout)
    }

    /// Reads any tensor back, e.g. to inspect intermediates after `infer`.
    pub fn read_tensor(&self, index: usize) -> GpuRuntimeResult<Vec<f32>> {
        let tensor = self
            .tensors
            .get(index)
            .ok_or(GpuRuntimeError::TensorIndexOutOfBounds {
                index,
                count: self.tensors.len(),
            })?;
        read_tensor(&self.ctx, tensor)
    }
}
