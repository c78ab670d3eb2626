//! Max pooling layer with a fixed integer ratio.

use super::{predecessor, write_prev_error, Layer, LayerDescr, LayerKind, TrainingContext};
use crate::error::{NetworkError, Result};
use crate::tensor::operation::{d_subsample, subsample};
use crate::tensor::Tensor;
use crate::utils::activations::Activation;
use log::info;
use std::any::Any;

/// Max pooling layer with a square window equal to its stride.
pub struct PoolLayer {
    name: String,
    subsample: usize,
    /// Activation of the pooled layer; max pooling commutes with it.
    activation: Activation,
    features: Tensor,
    errors: Tensor,
}

impl PoolLayer {
    /// Build a pooling layer on top of `prev`.
    ///
    /// # Errors
    ///
    /// `LayerConfiguration` when the window does not tile `prev` or the depth
    /// changes.
    pub fn populate(name: &str, prev: &dyn Layer, descr: &LayerDescr) -> Result<Self> {
        let invalid = || {
            NetworkError::LayerConfiguration("invalid subsampling for max pooling".to_string())
        };
        if descr.size_x == 0 || descr.size_y == 0 || prev.width() % descr.size_x != 0 {
            return Err(invalid());
        }
        let subsample = prev.width() / descr.size_x;
        if prev.height() != descr.size_y * subsample {
            return Err(invalid());
        }
        if descr.size_z != prev.depth() {
            return Err(NetworkError::LayerConfiguration(
                "depth mismatch between pooling layer and previous layer".to_string(),
            ));
        }
        info!(
            "populating max pooling layer {} ({}x{}x{}, subsample {})",
            name, descr.size_x, descr.size_y, descr.size_z, subsample
        );
        Ok(Self {
            name: name.to_string(),
            subsample,
            activation: prev.activation(),
            features: Tensor::new(descr.size_x, descr.size_y, 1, descr.size_z),
            errors: Tensor::new(descr.size_x, descr.size_y, 1, descr.size_z),
        })
    }

    /// Pooling window side.
    pub fn subsample(&self) -> usize {
        self.subsample
    }
}

impl Layer for PoolLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Pool
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn width(&self) -> usize {
        self.features.width()
    }

    fn height(&self) -> usize {
        self.features.height()
    }

    fn depth(&self) -> usize {
        self.features.depth2()
    }

    fn feature_maps(&self) -> &Tensor {
        &self.features
    }

    fn error_maps_mut(&mut self) -> Option<&mut Tensor> {
        Some(&mut self.errors)
    }

    fn error_maps(&self) -> Option<&Tensor> {
        Some(&self.errors)
    }

    fn activation(&self) -> Activation {
        self.activation
    }

    fn feed_forward(&mut self, prev: Option<&dyn Layer>, _ctx: &TrainingContext) -> Result<()> {
        let prev = predecessor(prev, &self.name)?;
        self.features = subsample(prev.feature_maps(), self.subsample)?;
        Ok(())
    }

    fn back_propagate(&mut self, prev: Option<&mut dyn Layer>, _ctx: &TrainingContext) -> Result<()> {
        let Some(prev) = prev else {
            return Ok(());
        };
        if prev.error_maps().is_none() {
            return Ok(());
        }
        let routed = d_subsample(&self.errors, prev.feature_maps(), self.subsample)?;
        write_prev_error(prev, routed)
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

    #[test]
    fn test_ratio_must_divide() {
        let input = InputLayer::populate("input0", &LayerDescr::input(10, 10, 2)).unwrap();
        assert!(PoolLayer::populate("pool1", &input, &LayerDescr::pool(3, 3, 2)).is_err());
        assert!(PoolLayer::populate("pool1", &input, &LayerDescr::pool(5, 5, 1)).is_err());
        let layer = PoolLayer::populate("pool1", &input, &LayerDescr::pool(5, 5, 2)).unwrap();
        assert_eq!(layer.subsample(), 2);
        assert_eq!(layer.nb_weights(), 0);
        assert!(layer.gradient_checker().is_none());
    }

    #[test]
    fn test_feed_forward_takes_window_max() {
        let mut input = InputLayer::populate("input0", &LayerDescr::input(4, 4, 1)).unwrap();
        let data: Vec<f32> = (0..16).map(|v| v as f32).collect();
        input.fill(&data).unwrap();
        let mut layer = PoolLayer::populate("pool1", &input, &LayerDescr::pool(2, 2, 1)).unwrap();
        layer
            .feed_forward(Some(&input), &TrainingContext::inference())
            .unwrap();
        assert_eq!(layer.feature_maps().data(), &[5.0, 7.0, 13.0, 15.0]);
    }
}
