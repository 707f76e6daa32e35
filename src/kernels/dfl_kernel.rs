//! Distribution focal loss decoding.

use serde::{Deserialize, Serialize};

use crate::errors::KernelResult;
use crate::kernels::{Kernel, require_nonzero};

/// Default number of distance bins per box side.
pub const DEFAULT_BINS: usize = 16;

/// Turns per-side bin logits into expected distances.
///
/// Input `[4 * bins, anchors]`, output `[4, anchors]`:
/// `out[s, a] = sum_b softmax(in[s * bins .. (s + 1) * bins, a])[b] * b`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DflKernel {
    #[serde(default = "default_bins")]
    pub bins: usize,
    pub anchors: usize,
}

fn default_bins() -> usize {
    DEFAULT_BINS
}

impl DflKernel {
    pub fn new(bins: usize, anchors: usize) -> KernelResult<Self> {
        let kernel = Self { bins, anchors };
        kernel.validate()?;
        Ok(kernel)
    }
}

impl Kernel for DflKernel {
    fn name(&self) -> String {
        format!("r_dfl_{}_{}", self.bins, self.anchors)
    }

    fn input_lens(&self) -> Vec<usize> {
        vec![4 * self.bins * self.anchors]
    }

    fn output_len(&self) -> usize {
        4 * self.anchors
    }

    fn validate(&self) -> KernelResult<()> {
        require_nonzero("dfl", "bins", self.bins)?;
        require_nonzero("dfl", "anchors", self.anchors)
    }

    fn wgsl_compute(&self) -> String {
        format!(
            "fn compute(idx: u32) -> f32 {{
    let side = idx / {a}u;
    let anchor = idx % {a}u;
    let base = side * {bins}u * {a}u + anchor;
    var peak = fetch(data1, base);
    for (var b = 1u; b < {bins}u; b = b + 1u) {{
        peak = max(peak, fetch(data1, base + b * {a}u));
    }}
    var total = 0.0;
    var weighted = 0.0;
    for (var b = 0u; b < {bins}u; b = b + 1u) {{
        let e = exp(fetch(data1, base + b * {a}u) - peak);
        total = total + e;
        weighted = weighted + e * f32(b);
    }}
    return weighted / total;
}}
",
            a = self.anchors,
            bins = self.bins,
        )
    }

    fn evaluate(&self, inputs: &[&[f32]], output: &mut [f32]) {
        let x = inputs[0];
        let a = self.anchors;
        for side in 0..4 {
            for anchor in 0..a {
                let base = side * self.bins * a + anchor;
                let logit = |b: usize| x[base + b * a];
                let peak = (1..self.bins).fold(logit(0), |m, b| m.max(logit(b)));
                let mut total = 0.0;
                let mut weighted = 0.0;
                for b in 0..self.bins {
                    let e = (logit(b) - peak).exp();
                    total += e;
                    weighted += e * b as f32;
                }
                output[side * a + anchor] = weighted / total;
            }
        }
    }
}
