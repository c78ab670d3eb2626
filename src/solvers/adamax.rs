//! Adamax update rule.

use super::{check_operands, normalization, Solver};
use crate::error::Result;
use crate::tensor::Tensor;

/// `m = μ₁m + (1−μ₁)ḡ; u = max(μ₂u + ε, |ḡ|); p −= α/(1−μ₁ᵗ) · m/u`
///
/// The step count `t` advances with every [`Solver::set_size`] call, that
/// is once per gradient descent.
#[derive(Debug, Clone)]
pub struct Adamax {
    learning_rate: f32,
    mu1: f32,
    mu2: f32,
    epsilon: f32,
    mu1_power: f32,
    normalize: f32,
}

impl Adamax {
    /// Create an Adamax solver.
    ///
    /// # Arguments
    ///
    /// * `learning_rate` - Step size α
    /// * `mu1` - Decay of the first moment
    /// * `mu2` - Decay of the infinity norm
    pub fn new(learning_rate: f32, mu1: f32, mu2: f32) -> Self {
        Self {
            learning_rate,
            mu1,
            mu2,
            epsilon: 1e-8,
            mu1_power: 1.0,
            normalize: 1.0,
        }
    }

    pub fn with_epsilon(mut self, epsilon: f32) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn mu1(&self) -> f32 {
        self.mu1
    }

    pub fn mu2(&self) -> f32 {
        self.mu2
    }

    fn bias_correction(&self) -> f32 {
        1.0 - self.mu1_power
    }
}

impl Default for Adamax {
    fn default() -> Self {
        Self::new(0.002, 0.9, 0.999)
    }
}

impl Solver for Adamax {
    fn name(&self) -> &'static str {
        "ADAMAX"
    }

    fn cache_size(&self) -> usize {
        2
    }

    fn set_size(&mut self, size: usize) -> Result<()> {
        self.normalize = normalization(size)?;
        self.mu1_power *= self.mu1;
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
        let step = self.learning_rate / self.bias_correction();
        let (first, rest) = cache.split_at_mut(1);
        let moment = first[0].data_mut();
        let norm = rest[0].data_mut();
        for (((p, m), u), g) in param
            .data_mut()
            .iter_mut()
            .zip(moment.iter_mut())
            .zip(norm.iter_mut())
            .zip(gradient.data())
        {
            let g = self.normalize * g;
            *m = self.mu1 * *m + (1.0 - self.mu1) * g;
            *u = (self.mu2 * *u + self.epsilon).max(g.abs());
            *p -= step * *m / *u;
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
