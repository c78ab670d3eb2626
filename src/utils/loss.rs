//! Loss functions used by the output layer.

use super::activations::Activation;
use crate::error::{NetworkError, Result};
use crate::tensor::Tensor;

const LOG_FLOOR: f32 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Loss {
    /// `0.5 Σ (y - t)²`
    #[default]
    MeanSquared,
    /// Binary cross-entropy per element, categorical when paired with softmax.
    CrossEntropy,
}

impl Loss {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "mse" | "mean_squared" => Some(Self::MeanSquared),
            "cross_entropy" | "crossentropy" => Some(Self::CrossEntropy),
            _ => None,
        }
    }

    /// Loss value for output `y` and target `t` produced by `activation`.
    pub fn f(&self, y: &Tensor, t: &Tensor, activation: Activation) -> Result<f32> {
        if !y.same_shape(t) {
            return Err(NetworkError::InconsistentSize("loss"));
        }
        let pairs = y.data().iter().zip(t.data().iter());
        let value = match self {
            Self::MeanSquared => 0.5 * pairs.map(|(y, t)| (y - t) * (y - t)).sum::<f32>(),
            Self::CrossEntropy if activation.is_one_hot() => {
                -pairs.map(|(y, t)| t * y.max(LOG_FLOOR).ln()).sum::<f32>()
            }
            Self::CrossEntropy => -pairs
                .map(|(y, t)| {
                    t * y.max(LOG_FLOOR).ln() + (1.0 - t) * (1.0 - y).max(LOG_FLOOR).ln()
                })
                .sum::<f32>(),
        };
        Ok(value)
    }

    /// Derivative of the loss with respect to `y`.
    pub fn d_f(&self, y: &Tensor, t: &Tensor) -> Result<Tensor> {
        if !y.same_shape(t) {
            return Err(NetworkError::InconsistentSize("loss derivative"));
        }
        let mut d = y.clone();
        d.data_mut()
            .iter_mut()
            .zip(t.data().iter())
            .for_each(|(y, t)| {
                *y = match self {
                    Self::MeanSquared => *y - t,
                    Self::CrossEntropy => (*y - t) / (*y * (1.0 - *y)).max(LOG_FLOOR),
                }
            });
        Ok(d)
    }

    /// Output error `dL/dz` for outputs `y` produced by `activation`.
    ///
    /// One-hot activations paired with cross-entropy reduce to `y - t`.
    pub fn output_error(&self, y: &Tensor, t: &Tensor, activation: Activation) -> Result<Tensor> {
        if activation.is_one_hot() && *self == Self::CrossEntropy {
            return crate::tensor::operation::sub(y, t);
        }
        let mut error = self.d_f(y, t)?;
        error.elemul_assign(&activation.d_f(y))?;
        Ok(error)
    }
}
