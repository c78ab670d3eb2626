//! Adagrad update rule.

use super::{check_operands, normalization, Solver};
use crate::error::Result;
use crate::tensor::Tensor;

/// `c += ḡ²; p −= α ḡ / sqrt(c + ε)`
#[derive(Debug, Clone)]
pub struct Adagrad {
    learning_rate: f32,
    epsilon: f32,
    normalize: f32,
}

impl Adagrad {
    pub fn new(learning_rate: f32, epsilon: f32) -> Self {
        Self {
            learning_rate,
            epsilon,
            normalize: 1.0,
        }
    }
}

impl Default for Adagrad {
    fn default() -> Self {
        Self::new(0.01, 1e-8)
    }
}

impl Solver for Adagrad {
    fn name(&self) -> &'static str {
        "ADAGRAD"
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
        let history = cache[0].data_mut();
        for ((p, c), g) in param
            .data_mut()
            .iter_mut()
            .zip(history.iter_mut())
            .zip(gradient.data())
        {
            let g = self.normalize * g;
            *c += g * g;
            *p -= self.learning_rate * g / (*c + self.epsilon).sqrt();
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

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_steps_shrink() {
        let mut solver = Adagrad::new(0.1, 0.0);
        solver.set_size(1).unwrap();
        let mut p = Tensor::filled(1, 1, 1, 1, 0.0);
        let mut c = Tensor::new(1, 1, 1, 1);
        let g = Tensor::filled(1, 1, 1, 1, 1.0);

        solver.update(&mut p, &mut [&mut c], &g).unwrap();
        assert_relative_eq!(p.data()[0], -0.1, epsilon = 1e-6);
        solver.update(&mut p, &mut [&mut c], &g).unwrap();
        assert_relative_eq!(p.data()[0], -0.1 - 0.1 / 2f32.sqrt(), epsilon = 1e-6);
    }
}
