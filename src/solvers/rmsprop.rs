//! RMSProp update rule.

use super::{check_operands, normalization, Solver};
use crate::error::Result;
use crate::tensor::Tensor;

/// `v = μv + (1−μ)ḡ²; p −= α ḡ / sqrt(v + ε)`
#[derive(Debug, Clone)]
pub struct RmsProp {
    learning_rate: f32,
    momentum: f32,
    epsilon: f32,
    normalize: f32,
}

impl RmsProp {
    pub fn new(learning_rate: f32, momentum: f32, epsilon: f32) -> Self {
        Self {
            learning_rate,
            momentum,
            epsilon,
            normalize: 1.0,
        }
    }
}

impl Default for RmsProp {
    fn default() -> Self {
        Self::new(0.001, 0.99, 1e-8)
    }
}

impl Solver for RmsProp {
    fn name(&self) -> &'static str {
        "RMS_PROP"
    }

    fn cache_size(&self) -> usize {
        1
    }

    fn set_size(&mut self, size: usize) -> Result<()> {
        self.normalize = normalization(size)?;
        Ok(())
    }

    fn normalize(&self) -> f32 {
        self.normalize
    }

    fn update(
        &self,
        param: &mut Tensor,
        cache: &mut [&mut Tensor],
        gradient: &Tensor,
    ) -> Result<()> {
        check_operands(param, cache, gradient, 1)?;
        let mean_square = cache[0].data_mut();
        for ((p, v), g) in param
            .data_mut()
            .iter_mut()
            .zip(mean_square.iter_mut())
            .zip(gradient.data())
        {
            let g = self.normalize * g;
            *v = self.momentum * *v + (1.0 - self.momentum) * g * g;
            *p -= self.learning_rate * g / (*v + self.epsilon).sqrt();
        }
        Ok(())
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f32) {
        self.learning_rate = lr;
    }
}
