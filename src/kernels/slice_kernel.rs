//! Contiguous slice kernel, used for channel chunking.

use serde::{Deserialize, Serialize};

use crate::errors::{KernelError, KernelResult};
use crate::kernels::{Kernel, require_nonzero};

/// Reads a contiguous window of its input: `out[i] = in[offset + i]`.
///
/// With NCHW and a batch of one, splitting along channels is a contiguous
/// slice of `channels * height * width` elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliceKernel {
    pub source_length: usize,
    pub offset: usize,
    pub length: usize,
}

impl SliceKernel {
    pub fn new(source_length: usize, offset: usize, length: usize) -> KernelResult<Self> {
        let kernel = Self {
            source_length,
            offset,
            length,
        };
        kernel.validate()?;
        Ok(kernel)
    }
}

impl Kernel for SliceKernel {
    fn name(&self) -> String {
        format!("E_slice_{}_{}_{}", self.source_length, self.offset, self.length)
    }

    fn input_lens(&self) -> Vec<usize> {
        vec![self.source_length]
    }

    fn output_len(&self) -> usize {
        self.length
    }

    fn validate(&self) -> KernelResult<()> {
        require_nonzero("slice", "length", self.length)?;
        if self.offset + self.length > self.source_length {
            return Err(KernelError::SliceOutOfBounds {
                offset: self.offset,
                length: self.length,
                source_length: self.source_length,
            });
        }
        Ok(())
    }

    fn wgsl_compute(&self) -> String {
        format!(
            "fn compute(idx: u32) -> f32 {{\n    return fetch(data1, idx + {offset}u);\n}}\n",
            offset = self.offset
        )
    }

    fn evaluate(&self, inputs: &[&[f32]], output: &mut [f32]) {
        output.copy_from_slice(&inputs[0][self.offset..self.offset + self.length]);
    }
}
