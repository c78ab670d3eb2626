//! Inverted dropout layer.
//!
//! During training, units are kept with probability `1 - rate` and scaled by
//! `1/(1 - rate)`. The mask is redrawn after every backward pass, so each
//! sample sees an independent mask. In inference the input passes through
//! unchanged.

use super::{predecessor, write_prev_error, Layer, LayerDescr, LayerKind, TrainingContext};
use crate::error::{NetworkError, Result};
use crate::tensor::operation::bernoulli;
use crate::tensor::Tensor;
use crate::utils::activations::Activation;
use crate::utils::rng::NetworkRng;
use log::info;
use std::any::Any;

/// Drop probability used when the layer description sets none.
pub const DEFAULT_DROPOUT_RATE: f32 = 0.5;

/// Dropout layer sized like its predecessor.
///
/// The layer reports the predecessor's activation so that error maps keep
/// referring to the same pre-activation values.
pub struct DropoutLayer {
    name: String,
    rate: f32,
    activation: Activation,
    features: Tensor,
    errors: Tensor,
    mask: Tensor,
    /// Predecessor's activation derivative captured during the forward pass.
    prev_derivative: Tensor,
    rng: NetworkRng,
}

impl DropoutLayer {
    /// Build a dropout layer on top of `prev`.
    ///
    /// # Arguments
    ///
    /// * `name` - Layer name
    /// * `prev` - Previous layer, whose size the layer must match
    /// * `descr` - Size and optional `dropout_rate` in `[0, 1)`
    /// * `rng` - Generator the layer forks its own mask generator from
    pub fn populate(
        name: &str,
        prev: &dyn Layer,
        descr: &LayerDescr,
        rng: &mut NetworkRng,
    ) -> Result<Self> {
        if (descr.size_x, descr.size_y, descr.size_z) != (prev.width(), prev.height(), prev.depth())
        {
            return Err(NetworkError::LayerConfiguration(
                "dropout layer size must match previous layer".to_string(),
            ));
        }
        let rate = descr.dropout_rate.unwrap_or(DEFAULT_DROPOUT_RATE);
        if !(0.0..1.0).contains(&rate) {
            return Err(NetworkError::LayerConfiguration(format!(
                "dropout rate {} outside [0, 1)",
                rate
            )));
        }
        info!(
            "populating dropout layer {} ({}x{}x{}, rate {})",
            name, descr.size_x, descr.size_y, descr.size_z, rate
        );
        let shape = Tensor::new(descr.size_x, descr.size_y, 1, descr.size_z);
        let mut layer = Self {
            name: name.to_string(),
            rate,
            activation: prev.activation(),
            features: shape.clone(),
            errors: shape.clone(),
            mask: shape.clone(),
            prev_derivative: shape,
            rng: rng.fork(),
        };
        layer.regenerate_mask();
        Ok(layer)
    }

    /// Probability of dropping a unit.
    pub fn rate(&self) -> f32 {
        self.rate
    }

    /// Binary keep mask for the next training pass.
    pub fn mask(&self) -> &Tensor {
        &self.mask
    }

    fn scale(&self) -> f32 {
        1.0 / (1.0 - self.rate)
    }

    fn regenerate_mask(&mut self) {
        bernoulli(&mut self.mask, 1.0 - self.rate, &mut self.rng);
    }
}

impl Layer for DropoutLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Dropout
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

    fn activation_derivative(&self) -> Tensor {
        self.prev_derivative.clone()
    }

    fn feed_forward(&mut self, prev: Option<&dyn Layer>, ctx: &TrainingContext) -> Result<()> {
        let prev = predecessor(prev, &self.name)?;
        let mut output = prev.feature_maps().clone();
        if ctx.training {
            output.elemul_assign(&self.mask)?;
            output *= self.scale();
        }
        self.features = output;
        self.prev_derivative = prev.activation_derivative();
        Ok(())
    }

    fn back_propagate(&mut self, prev: Option<&mut dyn Layer>, ctx: &TrainingContext) -> Result<()> {
        if let Some(prev) = prev {
            if prev.error_maps().is_some() {
                let mut routed = self.errors.clone();
                if ctx.training {
                    routed.elemul_assign(&self.mask)?;
                    routed *= self.scale();
                }
                write_prev_error(prev, routed)?;
            }
        }
        if ctx.training {
            self.regenerate_mask();
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
