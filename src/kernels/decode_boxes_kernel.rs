//! Anchor-free box decoding across detection levels.

use serde::{Deserialize, Serialize};

use crate::errors::{KernelError, KernelResult};
use crate::kernels::{Kernel, require_finite, require_nonzero, wgsl_float};

/// One detection grid: `height * width` anchors spaced `stride` pixels apart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionLevel {
    pub height: usize,
    pub width: usize,
    pub stride: f32,
}

impl DetectionLevel {
    pub fn anchors(&self) -> usize {
        self.height * self.width
    }
}

/// Converts `[4, anchors]` side distances `(left, top, right, bottom)` into
/// `[4, anchors]` boxes `(cx, cy, w, h)` in input pixels.
///
/// Anchors are enumerated level by level, row-major within a level, with
/// centres at `(x + 0.5, y + 0.5)` grid units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodeBoxesKernel {
    pub levels: Vec<DetectionLevel>,
}

impl DecodeBoxesKernel {
    pub fn new(levels: Vec<DetectionLevel>) -> KernelResult<Self> {
        let kernel = Self { levels };
        kernel.validate()?;
        Ok(kernel)
    }

    pub fn anchors(&self) -> usize {
        self.levels.iter().map(DetectionLevel::anchors).sum()
    }

    fn decode(ax: f32, ay: f32, stride: f32, ltrb: [f32; 4]) -> [f32; 4] {
        let [l, t, r, b] = ltrb;
        [
            (ax + (r - l) * 0.5) * stride,
            (ay + (b - t) * 0.5) * stride,
            (l + r) * stride,
            (t + b) * stride,
        ]
    }
}

impl Kernel for DecodeBoxesKernel {
    fn name(&self) -> String {
        let parts: Vec<String> = self
            .levels
            .iter()
            .map(|l| format!("{}x{}", l.height, l.width))
            .collect();
        format!("E_boxes_{}", parts.join("_"))
    }

    fn input_lens(&self) -> Vec<usize> {
        vec![4 * self.anchors()]
    }

    fn output_len(&self) -> usize {
        4 * self.anchors()
    }

    fn validate(&self) -> KernelResult<()> {
        if self.levels.is_empty() {
            return Err(KernelError::NoDetectionLevels);
        }
        for level in &self.levels {
            require_nonzero("decode_boxes", "height", level.height)?;
            require_nonzero("decode_boxes", "width", level.width)?;
            require_finite("decode_boxes", "stride", level.stride, false)?;
        }
        Ok(())
    }

    fn wgsl_compute(&self) -> String {
        let a = self.anchors();
        let mut src = String::new();
        src.push_str(&format!(
            "fn compute(idx: u32) -> f32 {{
    let row = idx / {a}u;
    let anchor = idx % {a}u;
    var local = anchor;
    var grid_w = 1u;
    var stride = 1.0;
"
        ));
        let mut start = 0;
        let last = self.levels.len() - 1;
        for (k, level) in self.levels.iter().enumerate() {
            let assign = format!(
                "local = anchor - {start}u; grid_w = {w}u; stride = {s};",
                w = level.width,
                s = wgsl_float(level.stride)
            );
            let end = start + level.anchors();
            if k == 0 && k == last {
                src.push_str(&format!("    {assign}\n"));
            } else if k == 0 {
                src.push_str(&format!("    if (anchor < {end}u) {{ {assign} }}\n"));
            } else if k == last {
                src.push_str(&format!("    else {{ {assign} }}\n"));
            } else {
                src.push_str(&format!("    else if (anchor < {end}u) {{ {assign} }}\n"));
            }
            start = end;
        }
        src.push_str(&format!(
            "    let ax = f32(local % grid_w) + 0.5;
    let ay = f32(local / grid_w) + 0.5;
    let l = fetch(data1, anchor);
    let t = fetch(data1, {a}u + anchor);
    let r = fetch(data1, {a2}u + anchor);
    let b = fetch(data1, {a3}u + anchor);
    if (row == 0u) {{ return (ax + (r - l) * 0.5) * stride; }}
    if (row == 1u) {{ return (ay + (b - t) * 0.5) * stride; }}
    if (row == 2u) {{ return (l + r) * stride; }}
    return (t + b) * stride;
}}
",
            a2 = 2 * a,
            a3 = 3 * a,
        ));
        src
    }

    fn evaluate(&self, inputs: &[&[f32]], output: &mut [f32]) {
        let x = inputs[0];
        let a = self.anchors();
        let mut anchor = 0;
        for level in &self.levels {
            for gy in 0..level.height {
                for gx in 0..level.width {
                    let ltrb = [x[anchor], x[a + anchor], x[2 * a + anchor], x[3 * a + anchor]];
                    let decoded =
                        Self::decode(gx as f32 + 0.5, gy as f32 + 0.5, level.stride, ltrb);
                    for (row, value) in decoded.into_iter().enumerate() {
                        output[row * a + anchor] = value;
                    }
                    anchor += 1;
                }
            }
        }
    }
}
