//! Inference-mode batch normalization with an optional fused activation.

use serde::{Deserialize, Serialize};

use crate::activation::{Activation, wgsl_activation};
use crate::errors::KernelResult;
use crate::kernels::{Kernel, require_finite, require_nonzero, wgsl_float};

/// Default epsilon of the detector's batch-norm layers.
pub const DEFAULT_EPS: f32 = 0.001;

/// Normalizes an NCHW tensor per channel using running statistics.
///
/// Inputs in binding order: `x [channels, spatial]`, `weight [channels]`,
/// `bias [channels]`, `running_mean [channels]`, `running_var [channels]`.
///
/// `out = act((x - mean) * weight / sqrt(var + eps) + bias)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchNormKernel {
    pub channels: usize,
    pub spatial: usize,
    #[serde(default = "default_eps")]
    pub eps: f32,
    #[serde(default)]
    pub activation: Option<Activation>,
}

fn default_eps() -> f32 {
    DEFAULT_EPS
}

impl BatchNormKernel {
    pub fn new(
        channels: usize,
        spatial: usize,
        eps: f32,
        activation: Option<Activation>,
    ) -> KernelResult<Self> {
        let kernel = Self {
            channels,
            spatial,
            eps,
            activation,
        };
        kernel.validate()?;
        Ok(kernel)
    }

    fn normalize(&self, x: f32, weight: f32, bias: f32, mean: f32, var: f32) -> f32 {
        (x - mean) * weight / (var + self.eps).sqrt() + bias
    }
}

impl Kernel for BatchNormKernel {
    fn name(&self) -> String {
        let act = self.activation.map(|a| a.short_name()).unwrap_or("id");
        format!("E_bn_{}_{}_{}", self.channels, self.spatial, act)
    }

    fn input_lens(&self) -> Vec<usize> {
        let c = self.channels;
        vec![c * self.spatial, c, c, c, c]
    }

    fn output_len(&self) -> usize {
        self.channels * self.spatial
    }

    fn validate(&self) -> KernelResult<()> {
        require_nonzero("batch_norm", "channels", self.channels)?;
        require_nonzero("batch_norm", "spatial", self.spatial)?;
        require_finite("batch_norm", "eps", self.eps, true)
    }

    fn wgsl_compute(&self) -> String {
        format!(
            "fn compute(idx: u32) -> f32 {{
    let c = idx / {spatial}u;
    let x = fetch(data1, idx);
    let v = (x - fetch(data4, c)) * fetch(data2, c) / sqrt(fetch(data5, c) + {eps}) + fetch(data3, c);
    return {out};
}}
",
            spatial = self.spatial,
            eps = wgsl_float(self.eps),
            out = wgsl_activation(self.activation, "v"),
        )
    }

    fn evaluate(&self, inputs: &[&[f32]], output: &mut [f32]) {
        let (x, weight, bias, mean, var) = (inputs[0], inputs[1], inputs[2], inputs[3], inputs[4]);
        for c in 0..self.channels {
            let start = c * self.spatial;
            for i in start..start + self.spatial {
                let v = self.normalize(x[i], weight[c], bias[c], mean[c], var[c]);
                output[i] = match self.activation {
                    Some(act) => act.apply_single(v),
                    None => v,
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::KernelError;

    #[test]
    fn test_identity_statistics() {
        let kernel = BatchNormKernel::new(2, 2, 0.0, None).unwrap();
        let x = vec![1.0, 2.0, 3.0, 4.0];
        let mut output = vec![0.0; 4];
        kernel
            .apply(
                &[&x, &[1.0, 1.0], &[0.0, 0.0], &[0.0, 0.0], &[1.0, 1.0]],
                &mut output,
            )
            .unwrap();
        assert_eq!(output, x);
    }

    #[test]
    fn test_per_channel_parameters() {
        let kernel = BatchNormKernel::new(2, 1, 0.0, None).unwrap();
        let mut output = vec![0.0; 2];
        kernel
            .apply(
                &[&[5.0, 5.0], &[2.0, 1.0], &[1.0, -1.0], &[1.0, 3.0], &[4.0, 1.0]],
                &mut output,
            )
            .unwrap();
        // (5 - 1) * 2 / 2 + 1 = 5, (5 - 3) * 1 / 1 - 1 = 1
        assert_eq!(output, vec![5.0, 1.0]);
    }

    #[test]
    fn test_zero_input_with_silu_stays_zero() {
        let kernel = BatchNormKernel::new(1, 3, DEFAULT_EPS, Some(Activation::Silu)).unwrap();
        let mut output = vec![1.0; 3];
        kernel
            .apply(&[&[0.0; 3], &[0.0], &[0.0], &[0.0], &[0.0]], &mut output)
            .unwrap();
        assert_eq!(output, vec![0.0; 3]);
    }

    #[test]
    fn test_non_finite_eps_rejected() {
        for eps in [f32::NAN, f32::INFINITY, -0.5] {
            assert!(matches!(
                BatchNormKernel::new(1, 1, eps, None),
                Err(KernelError::InvalidParameter { ref parameter, .. }) if parameter == "eps"
            ));
        }
    }

    #[test]
    fn test_eps_default_when_missing() {
        let kernel: BatchNormKernel =
            serde_json::from_str(r#"{"channels": 4, "spatial": 9}"#).unwrap();
        assert_eq!(kernel.eps, DEFAULT_EPS);
        assert_eq!(kernel.activation, None);
    }
}
