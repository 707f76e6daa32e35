//! Nearest-neighbour upsampling.

use serde::{Deserialize, Serialize};

use crate::errors::KernelResult;
use crate::kernels::{Kernel, require_nonzero};

/// Repeats every pixel `scale` times along both spatial axes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpsampleNearestKernel {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
    #[serde(default = "default_scale")]
    pub scale: usize,
}

fn default_scale() -> usize {
    2
}

impl UpsampleNearestKernel {
    pub fn new(channels: usize, height: usize, width: usize, scale: usize) -> KernelResult<Self> {
        let kernel = Self {
            channels,
            height,
            width,
            scale,
        };
        kernel.validate()?;
        Ok(kernel)
    }
}

impl Kernel for UpsampleNearestKernel {
    fn name(&self) -> String {
        format!(
            "E_upsample_{}_{}x{}_x{}",
            self.channels, self.height, self.width, self.scale
        )
    }

    fn input_lens(&self) -> Vec<usize> {
        vec![self.channels * self.height * self.width]
    }

    fn output_len(&self) -> usize {
        self.channels * self.height * self.width * self.scale * self.scale
    }

    fn validate(&self) -> KernelResult<()> {
        require_nonzero("upsample_nearest", "channels", self.channels)?;
        require_nonzero("upsample_nearest", "height", self.height)?;
        require_nonzero("upsample_nearest", "width", self.width)?;
        require_nonzero("upsample_nearest", "scale", self.scale)
    }

    fn wgsl_compute(&self) -> String {
        let ow = self.width * self.scale;
        let ohw = self.height * self.scale * ow;
        format!(
            "fn compute(idx: u32) -> f32 {{
    let c = idx / {ohw}u;
    let pos = idx % {ohw}u;
    let y = (pos / {ow}u) / {s}u;
    let x = (pos % {ow}u) / {s}u;
    return fetch(data1, c * {hw}u + y * {w}u + x);
}}
",
            s = self.scale,
            hw = self.height * self.width,
            w = self.width,
        )
    }

    fn evaluate(&self, inputs: &[&[f32]], output: &mut [f32]) {
        let x = inputs[0];
        let (oh, ow) = (self.height * self.scale, self.width * self.scale);
        for c in 0..self.channels {
            for oy in 0..oh {
                for ox in 0..ow {
                    let src = (c * self.height + oy / self.scale) * self.width + ox / self.scale;
                    output[(c * oh + oy) * ow + ox] = x[src];
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doubles_each_pixel() {
        let kernel = UpsampleNearestKernel::new(1, 2, 2, 2).unwrap();
        let mut output = vec![0.0; 16];
        kernel.apply(&[&[1.0, 2.0, 3.0, 4.0]], &mut output).unwrap();
        assert_eq!(
            output,
            vec![
                1.0, 1.0, 2.0, 2.0, //
                1.0, 1.0, 2.0, 2.0, //
                3.0, 3.0, 4.0, 4.0, //
                3.0, 3.0, 4.0, 4.0,
            ]
        );
    }

    #[test]
    fn test_channels_stay_separate() {
        let kernel = UpsampleNearestKernel::new(2, 1, 1, 3).unwrap();
        let mut output = vec![0.0; 18];
        kernel.apply(&[&[7.0, -1.0]], &mut output).unwrap();
        assert!(output[..9].iter().all(|&v| v == 7.0));
        assert!(output[9..].iter().all(|&v| v == -1.0));
    }
}
