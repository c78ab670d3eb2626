//! Parameter update rules.
//!
//! A solver holds hyperparameters and the normalization factor `1/batch_size`
//! of the current mini-batch. It never owns tensors: layers hand it their
//! parameter, its solver caches and the accumulated gradient.
//!
//! # Available Solvers
//!
//! - [`Sgd`]: gradient descent with momentum and weight decay
//! - [`RmsProp`]: running average of squared gradients
//! - [`Adadelta`]: ratio of running RMS of updates and gradients
//! - [`Adagrad`]: accumulated squared gradients
//! - [`Adamax`]: first moment scaled by a decayed infinity norm
//!
//! # Example
//!
//! ```
//! use rust_convnet::solvers::{Sgd, Solver};
//! use rust_convnet::tensor::Tensor;
//!
//! let mut solver = Sgd::new(0.1, 0.0, 0.0);
//! solver.set_size(1).unwrap();
//! let mut param = Tensor::filled(2, 1, 1, 1, 1.0);
//! let mut momentum = Tensor::new(2, 1, 1, 1);
//! let grad = Tensor::filled(2, 1, 1, 1, 1.0);
//! solver.update(&mut param, &mut [&mut momentum], &grad).unwrap();
//! assert!((param.data()[0] - 0.9).abs() < 1e-6);
//! ```

pub mod adadelta;
pub mod adagrad;
pub mod adamax;
pub mod rmsprop;
pub mod sgd;

pub use adadelta::Adadelta;
pub use adagrad::Adagrad;
pub use adamax::Adamax;
pub use rmsprop::RmsProp;
pub use sgd::Sgd;

use crate::error::{NetworkError, Result};
use crate::tensor::Tensor;
use parking_lot::Mutex;
use std::sync::Arc;

/// Solver handle shared by a network, its replicas and the learning scheduler.
pub type SharedSolver = Arc<Mutex<dyn Solver>>;

pub fn shared_solver<S: Solver + 'static>(solver: S) -> SharedSolver {
    Arc::new(Mutex::new(solver))
}

/// Common contract of the update rules.
pub trait Solver: Send {
    fn name(&self) -> &'static str;

    /// Number of cache tensors needed per parameter tensor.
    fn cache_size(&self) -> usize;

    /// Record the number of samples accumulated in the gradients.
    fn set_size(&mut self, size: usize) -> Result<()>;

    /// `1 / size` of the last [`Solver::set_size`] call.
    fn normalize(&self) -> f32;

    /// Update a weight tensor from its accumulated gradient.
    fn update(&self, param: &mut Tensor, cache: &mut [&mut Tensor], gradient: &Tensor)
        -> Result<()>;

    /// Update variant for biases. Weight decay is not applied.
    fn update_redux(
        &self,
        param: &mut Tensor,
        cache: &mut [&mut Tensor],
        gradient: &Tensor,
    ) -> Result<()> {
        self.update(param, cache, gradient)
    }

    fn learning_rate(&self) -> f32;

    fn set_learning_rate(&mut self, lr: f32);
}

/// Which update rule to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverKind {
    Sgd,
    RmsProp,
    Adadelta,
    Adagrad,
    Adamax,
}

impl SolverKind {
    /// Parse a configuration name: "SGD", "RMS_PROP", "ADADELTA", "ADAGRAD",
    /// "ADAMAX".
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_uppercase().as_str() {
            "SGD" => Some(Self::Sgd),
            "RMS_PROP" | "RMSPROP" => Some(Self::RmsProp),
            "ADADELTA" => Some(Self::Adadelta),
            "ADAGRAD" => Some(Self::Adagrad),
            "ADAMAX" => Some(Self::Adamax),
            _ => None,
        }
    }
}

/// Normalization factor for a batch of `size` samples.
pub(crate) fn normalization(size: usize) -> Result<f32> {
    if size == 0 {
        Err(NetworkError::ZeroSolverSize)
    } else {
        Ok(1.0 / size as f32)
    }
}

/// Check that parameter, caches and gradient line up.
pub(crate) fn check_operands(
    param: &Tensor,
    cache: &[&mut Tensor],
    gradient: &Tensor,
    expected_cache: usize,
) -> Result<()> {
    if cache.len() != expected_cache {
        return Err(NetworkError::InconsistentSize("solver cache"));
    }
    if !param.same_shape(gradient) || cache.iter().any(|c| !c.same_shape(param)) {
        return Err(NetworkError::InconsistentSize("solver update"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_size_rejected() {
        let mut solvers: Vec<Box<dyn Solver>> = vec![
            Box::new(Sgd::default()),
            Box::new(RmsProp::default()),
            Box::new(Adadelta::default()),
            Box::new(Adagrad::default()),
            Box::new(Adamax::default()),
        ];
        for solver in solvers.iter_mut() {
            assert!(matches!(solver.set_size(0), Err(NetworkError::ZeroSolverSize)));
            solver.set_size(4).unwrap();
            assert_eq!(solver.normalize(), 0.25);
        }
    }

    #[test]
    fn test_kind_from_name() {
        assert_eq!(SolverKind::from_name("RMS_PROP"), Some(SolverKind::RmsProp));
        assert_eq!(SolverKind::from_name("sgd"), Some(SolverKind::Sgd));
        assert_eq!(SolverKind::from_name("adam"), None);
    }

    #[test]
    fn test_cache_mismatch() {
        let solver = Sgd::default();
        let mut p = Tensor::new(2, 2, 1, 1);
        let g = Tensor::new(2, 2, 1, 1);
        assert!(solver.update(&mut p, &mut [], &g).is_err());
    }
}
