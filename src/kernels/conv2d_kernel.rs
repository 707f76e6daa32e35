//! 2D convolution (cross-correlation) with zero padding.
//!
//! The window taps are unrolled when the shader is generated. Each tap's
//! offset is a constant and bounds checks are only emitted when padding can
//! push a tap outside the input.

use serde::{Deserialize, Serialize};

use crate::errors::{KernelError, KernelResult};
use crate::kernels::{Kernel, require_nonzero, window_output};

/// Convolution over an NCHW input.
///
/// Inputs in binding order: `x [in_channels, height, width]`,
/// `weight [out_channels, in_channels, kh, kw]` and, when `bias` is set,
/// `bias [out_channels]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conv2dKernel {
    pub in_channels: usize,
    pub out_channels: usize,
    pub height: usize,
    pub width: usize,
    /// Window size as `[kh, kw]`.
    pub kernel: [usize; 2],
    #[serde(default = "default_stride")]
    pub stride: usize,
    #[serde(default)]
    pub padding: usize,
    #[serde(default)]
    pub bias: bool,
}

fn default_stride() -> usize {
    1
}

impl Conv2dKernel {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        height: usize,
        width: usize,
        kernel: [usize; 2],
        stride: usize,
        padding: usize,
        bias: bool,
    ) -> KernelResult<Self> {
        let conv = Self {
            in_channels,
            out_channels,
            height,
            width,
            kernel,
            stride,
            padding,
            bias,
        };
        conv.validate()?;
        Ok(conv)
    }

    /// Square window with `same`-style padding of `k / 2`.
    pub fn square(
        in_channels: usize,
        out_channels: usize,
        height: usize,
        width: usize,
        k: usize,
        stride: usize,
        bias: bool,
    ) -> KernelResult<Self> {
        Self::new(in_channels, out_channels, height, width, [k, k], stride, k / 2, bias)
    }

    pub fn out_height(&self) -> usize {
        window_output(self.height, self.kernel[0], self.stride, self.padding)
    }

    pub fn out_width(&self) -> usize {
        window_output(self.width, self.kernel[1], self.stride, self.padding)
    }

    fn taps(&self) -> usize {
        self.kernel[0] * self.kernel[1]
    }
}

impl Kernel for Conv2dKernel {
    fn name(&self) -> String {
        format!(
            "r_conv_{}_{}_{}x{}_k{}x{}_s{}_p{}{}",
            self.in_channels,
            self.out_channels,
            self.height,
            self.width,
            self.kernel[0],
            self.kernel[1],
            self.stride,
            self.padding,
            if self.bias { "_b" } else { "" }
        )
    }

    fn input_lens(&self) -> Vec<usize> {
        let mut lens = vec![
            self.in_channels * self.height * self.width,
            self.out_channels * self.in_channels * self.taps(),
        ];
        if self.bias {
            lens.push(self.out_channels);
        }
        lens
    }

    fn output_len(&self) -> usize {
        self.out_channels * self.out_height() * self.out_width()
    }

    fn validate(&self) -> KernelResult<()> {
        require_nonzero("conv2d", "in_channels", self.in_channels)?;
        require_nonzero("conv2d", "out_channels", self.out_channels)?;
        require_nonzero("conv2d", "height", self.height)?;
        require_nonzero("conv2d", "width", self.width)?;
        require_nonzero("conv2d", "kernel height", self.kernel[0])?;
        require_nonzero("conv2d", "kernel width", self.kernel[1])?;
        require_nonzero("conv2d", "stride", self.stride)?;
        let window = self.kernel[0].min(self.kernel[1]);
        if self.padding >= window {
            return Err(KernelError::PaddingTooLarge {
                kernel: "conv2d".to_string(),
                padding: self.padding,
                window,
            });
        }
        if self.out_height() == 0 || self.out_width() == 0 {
            return Err(KernelError::EmptyOutput {
                kernel: "conv2d".to_string(),
                height: self.out_height(),
                width: self.out_width(),
            });
        }
        Ok(())
    }

    fn wgsl_compute(&self) -> String {
        let (kh, kw) = (self.kernel[0], self.kernel[1]);
        let (oh, ow) = (self.out_height(), self.out_width());
        let padded = self.padding > 0;
        let mut src = String::new();
        src.push_str(&format!(
            "fn compute(idx: u32) -> f32 {{
    let oc = idx / {ohw}u;
    let pos = idx % {ohw}u;
    let iy0 = i32(pos / {ow}u) * {stride} - {pad};
    let ix0 = i32(pos % {ow}u) * {stride} - {pad};
    var acc = {init};
    for (var ic = 0u; ic < {ic}u; ic = ic + 1u) {{
        let xbase = ic * {hw}u;
        let wbase = (oc * {ic}u + ic) * {taps}u;
",
            ohw = oh * ow,
            ow = ow,
            stride = self.stride,
            pad = self.padding,
            init = if self.bias { "fetch(data3, oc)" } else { "0.0" },
            ic = self.in_channels,
            hw = self.height * self.width,
            taps = self.taps(),
        ));
        for ky in 0..kh {
            src.push_str("        {\n");
            src.push_str(&format!("            let iy = iy0 + {ky};\n"));
            if padded {
                src.push_str(&format!(
                    "            if (iy >= 0 && iy < {h}) {{\n",
                    h = self.height
                ));
            } else {
                src.push_str("            {\n");
            }
            src.push_str(&format!(
                "                let row = xbase + u32(iy) * {w}u;\n",
                w = self.width
            ));
            for kx in 0..kw {
                let tap = ky * kw + kx;
                let load = format!(
                    "acc = acc + fetch(data1, row + u32(ix0 + {kx})) * fetch(data2, wbase + {tap}u);"
                );
                if padded {
                    src.push_str(&format!(
                        "                if (ix0 + {kx} >= 0 && ix0 + {kx} < {w}) {{ {load} }}\n",
                        w = self.width
                    ));
                } else {
                    src.push_str(&format!("                {load}\n"));
                }
            }
            src.push_str("            }\n        }\n");
        }
        src.push_str("    }\n    return acc;\n}\n");
        src
    }

    fn evaluate(&self, inputs: &[&[f32]], output: &mut [f32]) {
        let (x, weight) = (inputs[0], inputs[1]);
        let (kh, kw) = (self.kernel[0], self.kernel[1]);
        let (h, w) = (self.height as isize, self.width as isize);
        let (oh, ow) = (self.out_height(), self.out_width());
        let hw = self.height * self.width;
        for oc in 0..self.out_channels {
            let init = if self.bias { inputs[2][oc] } else { 0.0 };
            for oy in 0..oh {
                for ox in 0..ow {
                    let iy0 = (oy * self.stride) as isize - self.padding as isize;
                    let ix0 = (ox * self.stride) as isize - self.padding as isize;
                    let mut acc = init;
                    for ic in 0..self.in_channels {
                        let wbase = (oc * self.in_channels + ic) * kh * kw;
                        for ky in 0..kh {
                            let iy = iy0 + ky as isize;
                            if iy < 0 || iy >= h {
                                continue;
                            }
                            for kx in 0..kw {
                                let ix = ix0 + kx as isize;
                                if ix < 0 || ix >= w {
                                    continue;
                                }
                                let xi = ic * hw + iy as usize * self.width + ix as usize;
                                acc += x[xi] * weight[wbase + ky * kw + kx];
                            }
                        }
                    }
                    output[(oc * oh + oy) * ow + ox] = acc;
                }
            }
        }
    }
}
