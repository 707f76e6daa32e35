//! 2D max pooling.

use serde::{Deserialize, Serialize};

use crate::errors::{KernelError, KernelResult};
use crate::kernels::{Kernel, require_nonzero, window_output};

/// Square-window max pooling over an NCHW input. Padded positions never
/// win the maximum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaxPool2dKernel {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
    pub window: usize,
    #[serde(default = "default_stride")]
    pub stride: usize,
    #[serde(default)]
    pub padding: usize,
}

fn default_stride() -> usize {
    1
}

impl MaxPool2dKernel {
    pub fn new(
        channels: usize,
        height: usize,
        width: usize,
        window: usize,
        stride: usize,
        padding: usize,
    ) -> KernelResult<Self> {
        let kernel = Self {
            channels,
            height,
            width,
            window,
            stride,
            padding,
        };
        kernel.validate()?;
        Ok(kernel)
    }

    pub fn out_height(&self) -> usize {
        window_output(self.height, self.window, self.stride, self.padding)
    }

    pub fn out_width(&self) -> usize {
        window_output(self.width, self.window, self.stride, self.padding)
    }
}

impl Kernel for MaxPool2dKernel {
    fn name(&self) -> String {
        format!(
            "r_maxpool_{}_{}x{}_k{}_s{}_p{}",
            self.channels, self.height, self.width, self.window, self.stride, self.padding
        )
    }

    fn input_lens(&self) -> Vec<usize> {
        vec![self.channels * self.height * self.width]
    }

    fn output_len(&self) -> usize {
        self.channels * self.out_height() * self.out_width()
    }

    fn validate(&self) -> KernelResult<()> {
        require_nonzero("max_pool2d", "channels", self.channels)?;
        require_nonzero("max_pool2d", "height", self.height)?;
        require_nonzero("max_pool2d", "width", self.width)?;
        require_nonzero("max_pool2d", "window", self.window)?;
        require_nonzero("max_pool2d", "stride", self.stride)?;
        // Larger padding would produce windows made only of padding.
        if self.padding > self.window / 2 {
            return Err(KernelError::PaddingTooLarge {
                kernel: "max_pool2d".to_string(),
                padding: self.padding,
                window: self.window,
            });
        }
        if self.out_height() == 0 || self.out_width() == 0 {
            return Err(KernelError::EmptyOutput {
                kernel: "max_pool2d".to_string(),
                height: self.out_height(),
                width: self.out_width(),
            });
        }
        Ok(())
    }

    fn wgsl_compute(&self) -> String {
        let (oh, ow) = (self.out_height(), self.out_width());
        let padded = self.padding > 0;
        let mut src = String::new();
        src.push_str(&format!(
            "fn compute(idx: u32) -> f32 {{
    let c = idx / {ohw}u;
    let pos = idx % {ohw}u;
    let iy0 = i32(pos / {ow}u) * {stride} - {pad};
    let ix0 = i32(pos % {ow}u) * {stride} - {pad};
    let base = c * {hw}u;
    var best = -3.40282347e38;
",
            ohw = oh * ow,
            ow = ow,
            stride = self.stride,
            pad = self.padding,
            hw = self.height * self.width,
        ));
        for ky in 0..self.window {
            for kx in 0..self.window {
                let load = format!(
                    "best = max(best, fetch(data1, base + u32(iy0 + {ky}) * {w}u + u32(ix0 + {kx})));",
                    w = self.width
                );
                if padded {
                    src.push_str(&format!(
                        "    if (iy0 + {ky} >= 0 && iy0 + {ky} < {h} && ix0 + {kx} >= 0 && ix0 + {kx} < {w}) {{ {load} }}\n",
                        h = self.height,
                        w = self.width
                    ));
                } else {
                    src.push_str(&format!("    {load}\n"));
                }
            }
        }
        src.push_str("    return best;\n}\n");
        src
    }

    fn evaluate(&self, inputs: &[&[f32]], output: &mut [f32]) {
        let x = inputs[0];
        let (h, w) = (self.height as isize, self.width as isize);
        let (oh, ow) = (self.out_height(), self.out_width());
        for c in 0..self.channels {
            let base = c * self.height * self.width;
            for oy in 0..oh {
                for ox in 0..ow {
                    let iy0 = (oy * self.stride) as isize - self.padding as isize;
                    let ix0 = (ox * self.stride) as isize - self.padding as isize;
                    let mut best = f32::MIN;
                    for iy in iy0..iy0 + self.window as isize {
                        for ix in ix0..ix0 + self.window as isize {
                            if iy < 0 || iy >= h || ix < 0 || ix >= w {
                                continue;
                            }
                            best = best.max(x[base + iy as usize * self.width + ix as usize]);
                        }
                    }
                    output[(c * oh + oy) * ow + ox] = best;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_padding_keeps_shape() {
        let pool = MaxPool2dKernel::new(4, 20, 20, 5, 1, 2).unwrap();
        assert_eq!(pool.output_len(), 4 * 20 * 20);
    }

    #[test]
    fn test_padding_never_wins() {
        let pool = MaxPool2dKernel::new(1, 2, 2, 3, 1, 1).unwrap();
        let x = vec![-5.0, -6.0, -7.0, -8.0];
        let mut output = vec![0.0; 4];
        pool.apply(&[&x], &mut output).unwrap();
        assert_eq!(output, vec![-5.0; 4]);
    }

    #[test]
    fn test_window_maximum() {
        let pool = MaxPool2dKernel::new(1, 3, 3, 3, 1, 1).unwrap();
        let x: Vec<f32> = (0..9).map(|v| v as f32).collect();
        let mut output = vec![0.0; 9];
        pool.apply(&[&x], &mut output).unwrap();
        assert_eq!(output, vec![4.0, 5.0, 5.0, 7.0, 8.0, 8.0, 7.0, 8.0, 8.0]);
    }

    #[test]
    fn test_excess_padding_rejected() {
        assert!(matches!(
            MaxPool2dKernel::new(1, 8, 8, 3, 1, 2),
            Err(KernelError::PaddingTooLarge { .. })
        ));
    }
}
