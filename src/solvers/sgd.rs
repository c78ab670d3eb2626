//! Stochastic gradient descent with momentum and L2 weight decay.

use super::{check_operands, normalization, Solver};
use crate::error::Result;
use crate::tensor::Tensor;

/// `v = μv − α(ḡ + λp); p += v` where `ḡ` is the normalized gradient.
#[derive(Debug, Clone)]
pub struct Sgd {
    learning_rate: f32,
    weight_decay: f32,
    momentum: f32,
    normalize: f32,
}

impl Sgd {
    pub fn new(learning_rate: f32, weight_decay: f32, momentum: f32) -> Self {
        Self {
            learning_rate,
            weight_decay,
            momentum,
            normalize: 1.0,
        }
    }

    pub fn weight_decay(&self) -> f32 {
        self.weight_decay
    }

    pub fn momentum(&self) -> f32 {
        self.momentum
    }

    fn step(
        &self,
        param: &mut Tensor,
        cache: &mut [&mut Tensor],
        gradient: &Tensor,
        decay: f32,
    ) -> Result<()> {
        check_operands(param, cache, gradient, 1)?;
        let velocity = cache[0].data_mut();
        for ((p, v), g) in param
            .data_mut()
            .iter_mut()
            .zip(velocity.iter_mut())
            .zip(gradient.data())
        {
            *v = self.momentum * *v - self.learning_rate * (self.normalize * g + decay * *p);
            *p += *v;
        }
        Ok(())
    }
}

impl Default for Sgd {
    fn default() -> Self {
        Self::new(0.01, 5e-5, 0.9)
    }
}

impl Solver for Sgd {
    fn name(&self) -> &'static str {
        "SGD"
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
        self.step(param, cache, gradient, self.weight_decay)
    }

    fn update_redux(
        &self,
        param: &mut Tensor,
        cache: &mut [&mut Tensor],
        gradient: &Tensor,
    ) -> Result<()> {
        self.step(param, cache, gradient, 0.0)
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f32) {
        self.learning_rate = lr;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_momentum_accumulates() {
        let mut solver = Sgd::new(0.1, 0.0, 0.5);
        solver.set_size(2).unwrap();
        let mut p = Tensor::filled(1, 1, 1, 1, 1.0);
        let mut v = Tensor::new(1, 1, 1, 1);
        let g = Tensor::filled(1, 1, 1, 1, 2.0);

        solver.update(&mut p, &mut [&mut v], &g).unwrap();
        assert_relative_eq!(v.data()[0], -0.1);
        assert_relative_eq!(p.data()[0], 0.9);

        solver.update(&mut p, &mut [&mut v], &g).unwrap();
        assert_relative_eq!(v.data()[0], -0.15);
        assert_relative_eq!(p.data()[0], 0.75);
    }

    #[test]
    fn test_weight_decay_only_on_weights() {
        let mut solver = Sgd::new(0.1, 0.5, 0.0);
        solver.set_size(1).unwrap();
        let g = Tensor::new(1, 1, 1, 1);

        let mut w = Tensor::filled(1, 1, 1, 1, 2.0);
        let mut vw = Tensor::new(1, 1, 1, 1);
        solver.update(&mut w, &mut [&mut vw], &g).unwrap();
        assert_relative_eq!(w.data()[0], 1.9);

        let mut b = Tensor::filled(1, 1, 1, 1, 2.0);
        let mut vb = Tensor::new(1, 1, 1, 1);
        solver.update_redux(&mut b, &mut [&mut vb], &g).unwrap();
        assert_relative_eq!(b.data()[0], 2.0);
    }
}
