//! Storage precision of a tensor.

use half::f16;
use serde::{Deserialize, Serialize};

/// Fixed per-tensor storage precision. Host data is always `f32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Precision {
    /// 32-bit float texels.
    #[default]
    #[serde(rename = "F32")]
    Full,
    /// 16-bit float texels.
    #[serde(rename = "F16")]
    Half,
}

impl Precision {
    /// Bytes used by a single texel.
    pub fn texel_size(self) -> usize {
        match self {
            Precision::Full => 4,
            Precision::Half => 2,
        }
    }

    /// Encodes host values into the texel byte representation.
    pub fn encode(self, values: &[f32]) -> Vec<u8> {
        match self {
            Precision::Full => bytemuck::cast_slice(values).to_vec(),
            Precision::Half => {
                let halves: Vec<f16> = values.iter().map(|&v| f16::from_f32(v)).collect();
                bytemuck::cast_slice(&halves).to_vec()
            }
        }
    }

    /// Decodes texel bytes back into host values.
    pub fn decode(self, bytes: &[u8]) -> Vec<f32> {
        match self {
            Precision::Full => bytes
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
            Precision::Half => bytes
                .chunks_exact(2)
                .map(|c| f16::from_le_bytes([c[0], c[1]]).to_f32())
                .collect(),
        }
    }

    /// Rounds a value to what this precision can store.
    pub fn quantize(self, value: f32) -> f32 {
        match self {
            Precision::Full => value,
            Precision::Half => f16::from_f32(value).to_f32(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_precision_is_bit_exact() {
        let values = vec![1.5, -0.0, f32::MIN_POSITIVE, 3.1415927, -1.0e30];
        let decoded = Precision::Full.decode(&Precision::Full.encode(&values));
        for (a, b) in values.iter().zip(decoded.iter()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn test_half_precision_rounds() {
        let values = vec![1.0, 0.1, -2.5, 1000.3];
        let bytes = Precision::Half.encode(&values);
        assert_eq!(bytes.len(), values.len() * 2);
        let decoded = Precision::Half.decode(&bytes);
        for (a, b) in values.iter().zip(decoded.iter()) {
            assert!((a - b).abs() <= a.abs() * 1e-3);
            assert_eq!(*b, Precision::Half.quantize(*a));
        }
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(serde_json::to_string(&Precision::Half).unwrap(), "\"F16\"");
        let p: Precision = serde_json::from_str("\"F32\"").unwrap();
        assert_eq!(p, Precision::Full);
    }
}
