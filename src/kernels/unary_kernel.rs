//! Elementwise unary kernel.

use serde::{Deserialize, Serialize};

use crate::activation::Activation;
use crate::errors::KernelResult;
use crate::kernels::{Kernel, require_nonzero};

/// Applies an activation to every element: `out[i] = op(in[i])`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnaryKernel {
    pub op: Activation,
    pub length: usize,
}

impl UnaryKernel {
    pub fn new(op: Activation, length: usize) -> KernelResult<Self> {
        let kernel = Self { op, length };
        kernel.validate()?;
        Ok(kernel)
    }
}

impl Kernel for UnaryKernel {
    fn name(&self) -> String {
        format!("E_{}_{}", self.op.short_name(), self.length)
    }

    fn input_lens(&self) -> Vec<usize> {
        vec![self.length]
    }

    fn output_len(&self) -> usize {
        self.length
    }

    fn validate(&self) -> KernelResult<()> {
        require_nonzero("unary", "length", self.length)
    }

    fn wgsl_compute(&self) -> String {
        format!(
            "fn compute(idx: u32) -> f32 {{\n    let x = fetch(data1, idx);\n    return {};\n}}\n",
            self.op.wgsl_expr("x")
        )
    }

    fn evaluate(&self, inputs: &[&[f32]], output: &mut [f32]) {
        for (out, &x) in output.iter_mut().zip(inputs[0].iter()) {
            *out = self.op.apply_single(x);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sigmoid_elementwise() {
        let kernel = UnaryKernel::new(Activation::Sigmoid, 3).unwrap();
        let input = vec![0.0, 100.0, -100.0];
        let mut output = vec![0.0; 3];
        kernel.apply(&[&input], &mut output).unwrap();
        assert!((output[0] - 0.5).abs() < 1e-7);
        assert!((output[1] - 1.0).abs() < 1e-6);
        assert!(output[2].abs() < 1e-6);
    }

    #[test]
    fn test_name_carries_op() {
        let kernel = UnaryKernel::new(Activation::Silu, 8).unwrap();
        assert_eq!(kernel.name(), "E_silu_8");
    }
}
