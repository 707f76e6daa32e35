//! Kernel templates executed by the runtime.
//!
//! A kernel computes one output tensor from zero or more input tensors. Each
//! template carries its shape parameters, generates the WGSL `compute`
//! function for the fragment stage with those parameters baked in as
//! constants, and provides a CPU reference implementation defining the
//! exact semantics. All spatial tensors are NCHW with a batch of one,
//! flattened row-major.
//!
//! Inside generated code, inputs are named `data1..dataK` and read with
//! `fetch(dataK, flat_index)`.

use std::fmt::Debug;

use crate::errors::{KernelError, KernelResult};

pub mod batch_norm_kernel;
pub mod binary_kernel;
pub mod concat_kernel;
pub mod conv2d_kernel;
pub mod copy_kernel;
pub mod decode_boxes_kernel;
pub mod dfl_kernel;
pub mod max_pool_kernel;
pub mod slice_kernel;
pub mod unary_kernel;
pub mod upsample_kernel;

pub use batch_norm_kernel::BatchNormKernel;
pub use binary_kernel::{BinaryKernel, BinaryOp};
pub use concat_kernel::ConcatKernel;
pub use conv2d_kernel::Conv2dKernel;
pub use copy_kernel::CopyKernel;
pub use decode_boxes_kernel::{DecodeBoxesKernel, DetectionLevel};
pub use dfl_kernel::DflKernel;
pub use max_pool_kernel::MaxPool2dKernel;
pub use slice_kernel::SliceKernel;
pub use unary_kernel::UnaryKernel;
pub use upsample_kernel::UpsampleNearestKernel;

/// Base trait for all kernel templates.
pub trait Kernel: Debug + Send + Sync {
    /// Short descriptive name including the baked shape parameters.
    fn name(&self) -> String;

    /// Expected lengths of the inputs, in binding order.
    fn input_lens(&self) -> Vec<usize>;

    /// Length of the produced tensor.
    fn output_len(&self) -> usize;

    /// Checks that the template parameters describe a valid computation.
    fn validate(&self) -> KernelResult<()>;

    /// Generates `fn compute(idx: u32) -> f32` returning output element `idx`.
    fn wgsl_compute(&self) -> String;

    /// CPU reference computation. Lengths are checked by [`Kernel::apply`].
    fn evaluate(&self, inputs: &[&[f32]], output: &mut [f32]);

    /// Applies the kernel on host buffers after checking their lengths.
    fn apply(&self, inputs: &[&[f32]], output: &mut [f32]) -> KernelResult<()> {
        let expected = self.input_lens();
        if inputs.len() != expected.len() {
            return Err(KernelError::InputCountMismatch {
                kernel: self.name(),
                expected: expected.len(),
                actual: inputs.len(),
            });
        }
        for (index, (input, &len)) in inputs.iter().zip(expected.iter()).enumerate() {
            if input.len() != len {
                return Err(KernelError::InputLengthMismatch {
                    kernel: self.name(),
                    index,
                    expected: len,
                    actual: input.len(),
                });
            }
        }
        if output.len() != self.output_len() {
            return Err(KernelError::OutputLengthMismatch {
                kernel: self.name(),
                expected: self.output_len(),
                actual: output.len(),
            });
        }
        self.evaluate(inputs, output);
        Ok(())
    }
}

/// Formats a float so WGSL parses it as a floating point literal.
pub(crate) fn wgsl_float(value: f32) -> String {
    format!("{:?}", value)
}

/// Output size of a strided window along one axis.
pub(crate) fn window_output(size: usize, window: usize, stride: usize, padding: usize) -> usize {
    let padded = size + 2 * padding;
    if padded < window {
        0
    } else {
        (padded - window) / stride + 1
    }
}

/// Returns an error when `value` is zero.
pub(crate) fn require_nonzero(kernel: &str, dimension: &str, value: usize) -> KernelResult<()> {
    if value == 0 {
        return Err(KernelError::ZeroDimension {
            kernel: kernel.to_string(),
            dimension: dimension.to_string(),
        });
    }
    Ok(())
}

/// Rejects NaN, infinite and out-of-range float parameters.
/// `allow_zero` selects between a non-negative and a positive bound.
pub(crate) fn require_finite(
    kernel: &str,
    parameter: &str,
    value: f32,
    allow_zero: bool,
) -> KernelResult<()> {
    let in_range = if allow_zero { value >= 0.0 } else { value > 0.0 };
    if !value.is_finite() || !in_range {
        return Err(KernelError::InvalidParameter {
            kernel: kernel.to_string(),
            parameter: parameter.to_string(),
            bound: if allow_zero { "non-negative" } else { "positive" }.to_string(),
            value: value.to_string(),
        });
    }
    Ok(())
}
