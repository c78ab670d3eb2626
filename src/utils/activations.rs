//! Activation functions applied to whole tensors.
//!
//! Derivatives are expressed from the activated output `y`, which is what
//! layers keep around after the forward pass.

use crate::tensor::Tensor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Activation {
    Identity,
    #[default]
    Sigmoid,
    Relu,
    Tanh,
    /// Normalized exponential over each feature map.
    Softmax,
}

impl Activation {
    /// Parse a configuration name ("sigmoid", "relu", ...).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "identity" | "linear" => Some(Self::Identity),
            "sigmoid" => Some(Self::Sigmoid),
            "relu" => Some(Self::Relu),
            "tanh" => Some(Self::Tanh),
            "softmax" => Some(Self::Softmax),
            _ => None,
        }
    }

    /// Activations whose outputs sum to one over a map.
    pub fn is_one_hot(&self) -> bool {
        matches!(self, Self::Softmax)
    }

    /// Apply the activation in place.
    pub fn f(&self, tensor: &mut Tensor) {
        match self {
            Self::Identity => {}
            Self::Sigmoid => tensor.map_inplace(sigmoid),
            Self::Relu => tensor.map_inplace(|v| v.max(0.0)),
            Self::Tanh => tensor.map_inplace(f32::tanh),
            Self::Softmax => {
                let len = tensor.matrix_size();
                if len > 0 {
                    for map in tensor.data_mut().chunks_exact_mut(len) {
                        softmax_inplace(map);
                    }
                }
            }
        }
    }

    /// Derivative evaluated from the activated output.
    pub fn d_f(&self, output: &Tensor) -> Tensor {
        let mut d = output.clone();
        match self {
            Self::Identity => d.fill_value(1.0),
            Self::Sigmoid | Self::Softmax => d.map_inplace(sigmoid_derivative),
            Self::Relu => d.map_inplace(|y| if y > 0.0 { 1.0 } else { 0.0 }),
            Self::Tanh => d.map_inplace(|y| 1.0 - y * y),
        }
        d
    }
}

/// 1 / (1 + exp(-x))
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Sigmoid derivative assuming y = sigmoid(x).
pub fn sigmoid_derivative(y: f32) -> f32 {
    y * (1.0 - y)
}

/// Softmax over a slice, using max subtraction for numerical stability.
pub fn softmax_inplace(values: &mut [f32]) {
    if values.is_empty() {
        return;
    }
    let max_value = values.iter().copied().fold(f32::MIN, f32::max);
    let mut sum = 0.0f32;
    for value in values.iter_mut() {
        *value = (*value - max_value).exp();
        sum += *value;
    }
    let inv_sum = 1.0 / sum;
    values.iter_mut().for_each(|v| *v *= inv_sum);
}
