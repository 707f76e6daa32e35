//! Elementwise activation functions.
//!
//! Every activation has a CPU implementation and the equivalent WGSL
//! expression, so kernels that fuse an activation produce the same values
//! on both paths up to floating point rounding.

use serde::{Deserialize, Serialize};

/// Represents the type of activation function to be applied.
/// Note: A None value indicates that no activation function should be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Activation {
    /// Rectified Linear Unit activation function: f(x) = max(0, x).
    Relu,
    /// Sigmoid activation function: f(x) = 1 / (1 + exp(-x)).
    Sigmoid,
    /// Sigmoid linear unit: f(x) = x * sigmoid(x).
    Silu,
    /// Hyperbolic tangent activation function: f(x) = tanh(x).
    Tanh,
    /// Exponential: f(x) = exp(x).
    Exp,
    /// Negation: f(x) = -x.
    Neg,
}

impl Activation {
    /// Get activation by string name.
    pub fn get_by_name(type_name: &str) -> Option<Self> {
        match type_name {
            "RELU" => Some(Activation::Relu),
            "SIGMOID" => Some(Activation::Sigmoid),
            "SILU" => Some(Activation::Silu),
            "TANH" => Some(Activation::Tanh),
            "EXP" => Some(Activation::Exp),
            "NEG" => Some(Activation::Neg),
            _ => None,
        }
    }

    /// Short lowercase name used in kernel names.
    pub fn short_name(self) -> &'static str {
        match self {
            Activation::Relu => "relu",
            Activation::Sigmoid => "sigmoid",
            Activation::Silu => "silu",
            Activation::Tanh => "tanh",
            Activation::Exp => "exp",
            Activation::Neg => "neg",
        }
    }

    /// Apply the activation function to a single value.
    pub fn apply_single(self, x: f32) -> f32 {
        match self {
            Activation::Relu => x.max(0.0),
            Activation::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            Activation::Silu => x / (1.0 + (-x).exp()),
            Activation::Tanh => x.tanh(),
            Activation::Exp => x.exp(),
            Activation::Neg => -x,
        }
    }

    /// Apply the activation function to a slice of values in place.
    pub fn apply_in_place(self, values: &mut [f32]) {
        for val in values.iter_mut() {
            *val = self.apply_single(*val);
        }
    }

    /// WGSL expression applying the activation to the expression `x`.
    pub fn wgsl_expr(self, x: &str) -> String {
        match self {
            Activation::Relu => format!("max({x}, 0.0)"),
            Activation::Sigmoid => format!("(1.0 / (1.0 + exp(-({x}))))"),
            Activation::Silu => format!("(({x}) / (1.0 + exp(-({x}))))"),
            Activation::Tanh => format!("tanh({x})"),
            Activation::Exp => format!("exp({x})"),
            Activation::Neg => format!("(-({x}))"),
        }
    }
}

/// Applies an optional activation to a WGSL expression.
pub fn wgsl_activation(activation: Option<Activation>, x: &str) -> String {
    match activation {
        Some(activation) => activation.wgsl_expr(x),
        None => x.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relu() {
        assert_eq!(Activation::Relu.apply_single(-2.0), 0.0);
        assert_eq!(Activation::Relu.apply_single(3.0), 3.0);
    }

    #[test]
    fn test_sigmoid_and_silu() {
        assert!((Activation::Sigmoid.apply_single(0.0) - 0.5).abs() < 1e-7);
        assert_eq!(Activation::Silu.apply_single(0.0), 0.0);
        let x = 2.0f32;
        let expected = x / (1.0 + (-x).exp());
        assert!((Activation::Silu.apply_single(x) - expected).abs() < 1e-7);
    }

    #[test]
    fn test_apply_in_place() {
        let mut values = vec![-1.0, 0.0, 1.0];
        Activation::Neg.apply_in_place(&mut values);
        assert_eq!(values, vec![1.0, -0.0, -1.0]);
    }

    #[test]
    fn test_get_by_name() {
        assert_eq!(Activation::get_by_name("SILU"), Some(Activation::Silu));
        assert_eq!(Activation::get_by_name("GELU"), None);
    }

    #[test]
    fn test_serde_uppercase() {
        let a: Activation = serde_json::from_str("\"SIGMOID\"").unwrap();
        assert_eq!(a, Activation::Sigmoid);
        assert_eq!(serde_json::to_string(&Activation::Silu).unwrap(), "\"SILU\"");
    }

    #[test]
    fn test_wgsl_expr_wraps_operand() {
        assert_eq!(Activation::Relu.wgsl_expr("v"), "max(v, 0.0)");
        assert_eq!(wgsl_activation(None, "v"), "v");
    }
}
