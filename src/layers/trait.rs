//! Layer trait definition.

use super::{LayerKind, TrainingContext};
use crate::error::{NetworkError, Result};
use crate::gradient_checker::TensorGradientChecker;
use crate::solvers::Solver;
use crate::tensor::{Parameter, Tensor};
use crate::utils::activations::Activation;
use std::any::Any;

/// Core trait for network layers.
///
/// The network calls these in a fixed cycle: `feed_forward` in layer order,
/// `back_propagate` in reverse order, then `update_gradients` in layer order.
/// `clear_gradients` and `gradient_descent` bracket a mini-batch.
///
/// Layers are `Send` so a whole network can move to a worker thread.
pub trait Layer: Send {
    fn kind(&self) -> LayerKind;

    fn name(&self) -> &str;

    fn width(&self) -> usize;

    fn height(&self) -> usize;

    fn depth(&self) -> usize;

    fn size(&self) -> usize {
        self.width() * self.height() * self.depth()
    }

    fn feature_maps(&self) -> &Tensor;

    /// Error sink of the layer; `None` for layers that take no error.
    fn error_maps_mut(&mut self) -> Option<&mut Tensor> {
        None
    }

    fn error_maps(&self) -> Option<&Tensor> {
        None
    }

    /// Activation that produced the feature maps.
    fn activation(&self) -> Activation;

    /// Activation derivative evaluated at the current feature maps.
    fn activation_derivative(&self) -> Tensor {
        self.activation().d_f(self.feature_maps())
    }

    /// Compute the feature maps from the predecessor's.
    fn feed_forward(&mut self, prev: Option<&dyn Layer>, ctx: &TrainingContext) -> Result<()>;

    /// Write the predecessor's error maps from this layer's.
    fn back_propagate(&mut self, _prev: Option<&mut dyn Layer>, _ctx: &TrainingContext) -> Result<()> {
        Ok(())
    }

    /// Accumulate parameter gradients for the current sample.
    fn update_gradients(&mut self, _prev: Option<&dyn Layer>) -> Result<()> {
        Ok(())
    }

    fn clear_gradients(&mut self) {
        for parameter in [self.weights(), self.bias()].into_iter().flatten() {
            parameter.clear_delta();
        }
    }

    /// Apply the solver to every parameter. Biases use the redux rule.
    fn gradient_descent(&mut self, solver: &dyn Solver) -> Result<()> {
        if let Some(weights) = self.weights() {
            weights.descend(solver, false)?;
        }
        if let Some(bias) = self.bias() {
            bias.descend(solver, true)?;
        }
        Ok(())
    }

    fn weights(&self) -> Option<&Parameter> {
        None
    }

    fn bias(&self) -> Option<&Parameter> {
        None
    }

    fn nb_weights(&self) -> usize {
        self.weights().map_or(0, Parameter::size)
    }

    fn nb_bias(&self) -> usize {
        self.bias().map_or(0, Parameter::size)
    }

    fn fill_w(&mut self, data: &[f32]) -> Result<()> {
        match self.weights() {
            Some(weights) => weights.fill(data),
            None if data.is_empty() => Ok(()),
            None => Err(NetworkError::InconsistentLayerSize),
        }
    }

    fn fill_b(&mut self, data: &[f32]) -> Result<()> {
        match self.bias() {
            Some(bias) => bias.fill(data),
            None if data.is_empty() => Ok(()),
            None => Err(NetworkError::InconsistentLayerSize),
        }
    }

    /// Number of inputs feeding one output unit.
    fn fan_in(&self) -> usize {
        0
    }

    /// Checker pairing the live weights with their accumulated deltas.
    fn gradient_checker(&self) -> Option<TensorGradientChecker> {
        self.weights()
            .map(|w| TensorGradientChecker::new(w.value.clone(), w.delta.clone()))
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}
