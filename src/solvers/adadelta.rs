//! Adadelta update rule.

use super::{check_operands, normalization, Solver};
use crate::error::Result;
use crate::tensor::Tensor;

/// Scales each step by the ratio of the running RMS of past updates to the
/// running RMS of gradients. Uses two caches: squared gradients first,
/// squared updates second.
#[derive(Debug, Clone)]
pub struct Adadelta {
    learning_rate: f32,
    momentum: f32,
    epsilon: f32,
    normalize: f32,
}

impl Adadelta {
    pub fn new(learning_rate: f32, momentum: f32, epsilon: f32) -> Self {
        Self {
            learning_rate,
            momentum,
            epsilon,
            normalize: 1.0,
        }
    }
}

impl Default for Adadelta {
    fn default() -> Self {
        Self::new(1.0, 0.95, 1e-8)
    }
}

impl Solver for Adadelta {
    fn name(&self) -> &'static str {
        "ADADELTA"
    }

    fn cache_size(&self) -> usize {
        2
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
        check_operands(param, cache, gradient, 2)?;
        let (grad_cache, update_cache) = cache.split_at_mut(1);
        let squared_grad = grad_cache[0].data_mut();
        let squared_update = update_cache[0].data_mut();
        let mu = self.momentum;
        for (i, p) in param.data_mut().iter_mut().enumerate() {
            let g = self.normalize * gradient.data()[i];
            squared_grad[i] = mu * squared_grad[i] + (1.0 - mu) * g * g;
            let adjusted = ((squared_update[i] + self.epsilon) / (squared_grad[i] + self.epsilon))
                .sqrt()
                * g;
            squared_update[i] = mu * squared_update[i] + (1.0 - mu) * adjusted * adjusted;
            *p -= self.learning_rate * adjusted;
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
