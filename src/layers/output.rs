//! Output layer: a fully connected layer that owns the training target.
//!
//! The backward pass starts here. The output error is derived from the loss
//! and the activation, and the loss of every backward call is folded into a
//! running mean.

use super::full::FullLayer;
use super::{Layer, LayerDescr, LayerKind, TrainingContext};
use crate::error::{NetworkError, Result};
use crate::tensor::{Parameter, ParameterAllocator, Tensor};
use crate::utils::activations::Activation;
use crate::utils::loss::Loss;
use std::any::Any;

/// Last layer of every network.
///
/// Wraps a [`FullLayer`] and adds the target values and loss bookkeeping.
pub struct OutputLayer {
    full: FullLayer,
    loss: Loss,
    training_output: Tensor,
    loss_sum: f64,
    loss_count: usize,
}

impl OutputLayer {
    /// Build the output layer on top of `prev`.
    ///
    /// # Arguments
    ///
    /// * `name` - Layer name
    /// * `prev` - Previous layer
    /// * `descr` - Layer size, activation and loss
    /// * `alloc` - Source of the weight and bias tensors
    pub fn populate(
        name: &str,
        prev: &dyn Layer,
        descr: &LayerDescr,
        alloc: &mut ParameterAllocator<'_>,
    ) -> Result<Self> {
        let full = FullLayer::populate(name, prev, descr, alloc)?;
        let training_output = full.features.clone();
        Ok(Self {
            full,
            loss: descr.loss.unwrap_or_default(),
            training_output,
            loss_sum: 0.0,
            loss_count: 0,
        })
    }

    /// Loss function the error is derived from.
    pub fn loss(&self) -> Loss {
        self.loss
    }

    /// Set the target for the next backward pass.
    pub fn fill_output(&mut self, data: &[f32]) -> Result<()> {
        if data.len() > self.training_output.size() {
            return Err(NetworkError::OutputSize);
        }
        self.training_output.grouped_fill(data)
    }

    /// Target values of the current sample.
    pub fn training_output(&self) -> &Tensor {
        &self.training_output
    }

    /// Loss of the current feature maps against the current target.
    pub fn current_loss(&self) -> Result<f32> {
        self.loss
            .f(&self.full.features, &self.training_output, self.full.activation)
    }

    /// Running mean of the loss since the last reset.
    pub fn mean_loss(&self) -> f32 {
        if self.loss_count == 0 {
            0.0
        } else {
            (self.loss_sum / self.loss_count as f64) as f32
        }
    }

    /// `(sum, count)` of the losses behind [`OutputLayer::mean_loss`].
    pub fn loss_stats(&self) -> (f64, usize) {
        (self.loss_sum, self.loss_count)
    }

    /// Forget the losses accumulated so far.
    pub fn reset_loss(&mut self) {
        self.loss_sum = 0.0;
        self.loss_count = 0;
    }
}

impl Layer for OutputLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Output
    }

    fn name(&self) -> &str {
        self.full.name()
    }

    fn width(&self) -> usize {
        self.full.width()
    }

    fn height(&self) -> usize {
        self.full.height()
    }

    fn depth(&self) -> usize {
        self.full.depth()
    }

    fn feature_maps(&self) -> &Tensor {
        self.full.feature_maps()
    }

    fn error_maps_mut(&mut self) -> Option<&mut Tensor> {
        self.full.error_maps_mut()
    }

    fn error_maps(&self) -> Option<&Tensor> {
        self.full.error_maps()
    }

    fn activation(&self) -> Activation {
        self.full.activation
    }

    fn feed_forward(&mut self, prev: Option<&dyn Layer>, ctx: &TrainingContext) -> Result<()> {
        self.full.feed_forward(prev, ctx)
    }

    fn back_propagate(&mut self, prev: Option<&mut dyn Layer>, ctx: &TrainingContext) -> Result<()> {
        self.full.errors = self.loss.output_error(
            &self.full.features,
            &self.training_output,
            self.full.activation,
        )?;
        self.loss_sum += f64::from(self.current_loss()?);
        self.loss_count += 1;
        self.full.back_propagate(prev, ctx)
    }

    fn update_gradients(&mut self, prev: Option<&dyn Layer>) -> Result<()> {
        self.full.update_gradients(prev)
    }

    fn weights(&self) -> Option<&Parameter> {
        self.full.weights()
    }

    fn bias(&self) -> Option<&Parameter> {
        self.full.bias()
    }

    fn fan_in(&self) -> usize {
        self.full.fan_in()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::InputLayer;
    use crate::utils::rng::NetworkRng;
    use approx::assert_relative_eq;

    #[test]
    fn test_error_and_running_loss() {
        let mut input = InputLayer::populate("input0", &LayerDescr::input(2, 1, 1)).unwrap();
        input.fill(&[1.0, 1.0]).unwrap();
        let mut rng = NetworkRng::new(1);
        let mut alloc = ParameterAllocator::private(&mut rng, 1);
        let descr = LayerDescr::output(1, 1, 1)
            .with_activation(Activation::Identity)
            .with_loss(Loss::MeanSquared);
        let mut layer = OutputLayer::populate("output1", &input, &descr, &mut alloc).unwrap();
        layer.fill_w(&[1.0, 1.0]).unwrap();
        layer.fill_b(&[0.0]).unwrap();
        layer.fill_output(&[1.0]).unwrap();
        let ctx = TrainingContext::training();

        layer.feed_forward(Some(&input), &ctx).unwrap();
        layer.back_propagate(Some(&mut input), &ctx).unwrap();

        // y = 2, t = 1
        assert_relative_eq!(layer.error_maps().unwrap().data()[0], 1.0);
        assert_relative_eq!(layer.mean_loss(), 0.5);

        layer.fill_output(&[2.0]).unwrap();
        layer.back_propagate(Some(&mut input), &ctx).unwrap();
        assert_relative_eq!(layer.mean_loss(), 0.25);
        layer.reset_loss();
        assert_eq!(layer.loss_stats(), (0.0, 0));
    }

    #[test]
    fn test_output_size_checked() {
        let input = InputLayer::populate("input0", &LayerDescr::input(2, 1, 1)).unwrap();
        let mut rng = NetworkRng::new(1);
        let mut alloc = ParameterAllocator::private(&mut rng, 1);
        let mut layer =
            OutputLayer::populate("output1", &input, &LayerDescr::output(2, 1, 1), &mut alloc)
                .unwrap();
        assert!(matches!(
            layer.fill_output(&[0.0; 3]),
            Err(NetworkError::OutputSize)
        ));
    }
}
