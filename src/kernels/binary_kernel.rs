//! Elementwise binary kernel.

use serde::{Deserialize, Serialize};

use crate::errors::KernelResult;
use crate::kernels::{Kernel, require_nonzero};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
}

impl BinaryOp {
    pub fn apply_single(self, a: f32, b: f32) -> f32 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
        }
    }

    fn short_name(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
        }
    }
}

/// Combines two equally sized inputs: `out[i] = a[i] op b[i]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryKernel {
    pub op: BinaryOp,
    pub length: usize,
}

impl BinaryKernel {
    pub fn new(op: BinaryOp, length: usize) -> KernelResult<Self> {
        let kernel = Self { op, length };
        kernel.validate()?;
        Ok(kernel)
    }
}

impl Kernel for BinaryKernel {
    fn name(&self) -> String {
        format!("E_{}_{}", self.op.short_name(), self.length)
    }

    fn input_lens(&self) -> Vec<usize> {
        vec![self.length, self.length]
    }

    fn output_len(&self) -> usize {
        self.length
    }

    fn validate(&self) -> KernelResult<()> {
        require_nonzero("binary", "length", self.length)
    }

    fn wgsl_compute(&self) -> String {
        format!(
            "fn compute(idx: u32) -> f32 {{\n    return fetch(data1, idx) {} fetch(data2, idx);\n}}\n",
            self.op.symbol()
        )
    }

    fn evaluate(&self, inputs: &[&[f32]], output: &mut [f32]) {
        for ((out, &a), &b) in output.iter_mut().zip(inputs[0]).zip(inputs[1]) {
            *out = self.op.apply_single(a, b);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_residual_add() {
        let kernel = BinaryKernel::new(BinaryOp::Add, 3).unwrap();
        let mut output = vec![0.0; 3];
        kernel
            .apply(&[&[1.0, 2.0, 3.0], &[0.5, -2.0, 1.0]], &mut output)
            .unwrap();
        assert_eq!(output, vec![1.5, 0.0, 4.0]);
    }

    #[test]
    fn test_sub_and_mul() {
        assert_eq!(BinaryOp::Sub.apply_single(3.0, 5.0), -2.0);
        assert_eq!(BinaryOp::Mul.apply_single(3.0, 5.0), 15.0);
    }

    #[test]
    fn test_requires_two_inputs() {
        let kernel = BinaryKernel::new(BinaryOp::Mul, 2).unwrap();
        let mut output = vec![0.0; 2];
        assert!(kernel.apply(&[&[1.0, 2.0]], &mut output).is_err());
    }
}
