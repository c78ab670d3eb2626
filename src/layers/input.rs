//! Input layer: holds the current sample.

use super::{Layer, LayerDescr, LayerKind, TrainingContext};
use crate::error::{NetworkError, Result};
use crate::tensor::Tensor;
use crate::utils::activations::Activation;
use log::info;
use std::any::Any;

/// First layer of every network. It has no parameters.
pub struct InputLayer {
    name: String,
    features: Tensor,
}

impl InputLayer {
    /// Build an input layer of `descr`'s size.
    pub fn populate(name: &str, descr: &LayerDescr) -> Result<Self> {
        if descr.size() == 0 {
            return Err(NetworkError::LayerConfiguration(format!(
                "empty input layer {}",
                name
            )));
        }
        info!(
            "populating input layer {} ({}x{}x{})",
            name, descr.size_x, descr.size_y, descr.size_z
        );
        Ok(Self {
            name: name.to_string(),
            features: Tensor::new(descr.size_x, descr.size_y, 1, descr.size_z),
        })
    }

    /// Copy a sample into the feature maps, all maps sequentially.
    pub fn fill(&mut self, data: &[f32]) -> Result<()> {
        if data.len() > self.features.size() {
            return Err(NetworkError::SampleSize);
        }
        self.features.grouped_fill(data)
    }
}

impl Layer for InputLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Input
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

    fn activation(&self) -> Activation {
        Activation::Identity
    }

    fn feed_forward(&mut self, _prev: Option<&dyn Layer>, _ctx: &TrainingContext) -> Result<()> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
