//! Identity copy kernel.

use serde::{Deserialize, Serialize};

use crate::errors::KernelResult;
use crate::kernels::{Kernel, require_nonzero};

/// Copies an input tensor verbatim: `out[i] = in[i]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CopyKernel {
    pub length: usize,
}

impl CopyKernel {
    pub fn new(length: usize) -> KernelResult<Self> {
        let kernel = Self { length };
        kernel.validate()?;
        Ok(kernel)
    }
}

impl Kernel for CopyKernel {
    fn name(&self) -> String {
        format!("E_copy_{}", self.length)
    }

    fn input_lens(&self) -> Vec<usize> {
        vec![self.length]
    }

    fn output_len(&self) -> usize {
        self.length
    }

    fn validate(&self) -> KernelResult<()> {
        require_nonzero("copy", "length", self.length)
    }

    fn wgsl_compute(&self) -> String {
        "fn compute(idx: u32) -> f32 {\n    return fetch(data1, idx);\n}\n".to_string()
    }

    fn evaluate(&self, inputs: &[&[f32]], output: &mut [f32]) {
        output.copy_from_slice(inputs[0]);
    }
}
