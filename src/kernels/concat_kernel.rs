//! Concatenation kernel routing disjoint index ranges from several inputs.

use serde::{Deserialize, Serialize};

use crate::errors::{KernelError, KernelResult};
use crate::kernels::{Kernel, require_nonzero};

/// Concatenates inputs of shape `[outer, inner_k]` along the inner axis.
///
/// The output has shape `[outer, sum(inner)]`. With `outer == 1` this is a
/// plain flat concatenation, which is also channel concatenation for NCHW
/// tensors with a batch of one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcatKernel {
    pub outer: usize,
    pub inner: Vec<usize>,
}

impl ConcatKernel {
    pub fn new(outer: usize, inner: Vec<usize>) -> KernelResult<Self> {
        let kernel = Self { outer, inner };
        kernel.validate()?;
        Ok(kernel)
    }

    /// Flat concatenation of tensors with the given lengths.
    pub fn flat(lengths: Vec<usize>) -> KernelResult<Self> {
        Self::new(1, lengths)
    }

    fn total_inner(&self) -> usize {
        self.inner.iter().sum()
    }
}

impl Kernel for ConcatKernel {
    fn name(&self) -> String {
        let parts: Vec<String> = self.inner.iter().map(|n| n.to_string()).collect();
        format!("E_cat_{}_{}", self.outer, parts.join("_"))
    }

    fn input_lens(&self) -> Vec<usize> {
        self.inner.iter().map(|&n| n * self.outer).collect()
    }

    fn output_len(&self) -> usize {
        self.outer * self.total_inner()
    }

    fn validate(&self) -> KernelResult<()> {
        require_nonzero("concat", "outer size", self.outer)?;
        if self.inner.is_empty() {
            return Err(KernelError::EmptyConcat);
        }
        for &n in &self.inner {
            require_nonzero("concat", "inner size", n)?;
        }
        Ok(())
    }

    fn wgsl_compute(&self) -> String {
        let total = self.total_inner();
        let mut body = format!(
            "fn compute(idx: u32) -> f32 {{\n    let row = idx / {total}u;\n    let col = idx % {total}u;\n"
        );
        let mut start = 0;
        let last = self.inner.len() - 1;
        for (k, &n) in self.inner.iter().enumerate() {
            let fetch = format!("fetch(data{}, row * {}u + (col - {}u))", k + 1, n, start);
            if k == last {
                body.push_str(&format!("    return {fetch};\n"));
            } else {
                body.push_str(&format!(
                    "    if (col < {end}u) {{ return {fetch}; }}\n",
                    end = start + n
                ));
            }
            start += n;
        }
        body.push_str("}\n");
        body
    }

    fn evaluate(&self, inputs: &[&[f32]], output: &mut [f32]) {
        let total = self.total_inner();
        for row in 0..self.outer {
            let mut col = 0;
            for (input, &n) in inputs.iter().zip(self.inner.iter()) {
                output[row * total + col..row * total + col + n]
                    .copy_from_slice(&input[row * n..(row + 1) * n]);
                col += n;
            }
        }
    }
}
