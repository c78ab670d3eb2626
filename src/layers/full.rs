//! Fully connected layer.
//!
//! Weights are stored as one `(width, prev_size)` matrix per feature map and
//! applied as `activation(W·x + b)`. When the layer has a single feature map
//! and its predecessor is multi-map or two dimensional, the predecessor's
//! maps are grouped into one column vector first.

use super::{predecessor, write_prev_error, Layer, LayerDescr, LayerKind, TrainingContext};
use crate::error::{NetworkError, Result};
use crate::tensor::operation::{group, muladd, multrans1, multrans2, ungroup};
use crate::tensor::{Initializer, Parameter, ParameterAllocator, Tensor};
use crate::utils::activations::Activation;
use log::info;
use std::any::Any;
use std::borrow::Cow;

/// Fully connected layer.
///
/// # Fields
///
/// * `grouped` - Whether the predecessor's maps are flattened into one column
/// * `fan_in` - Inputs per unit
/// * `weights` - `(width, fan_in, 1, depth)` matrices
/// * `bias` - One bias per unit
pub struct FullLayer {
    pub(super) name: String,
    pub(super) activation: Activation,
    pub(super) grouped: bool,
    pub(super) fan_in: usize,
    pub(super) features: Tensor,
    pub(super) errors: Tensor,
    pub(super) weights: Parameter,
    pub(super) bias: Parameter,
}

impl FullLayer {
    /// Build a fully connected layer on top of `prev`.
    ///
    /// The predecessor is used as is when it is a column with the same depth;
    /// otherwise a single-map layer groups it.
    ///
    /// # Arguments
    ///
    /// * `name` - Layer name, also the prefix of its parameter tensors
    /// * `prev` - Previous layer
    /// * `descr` - Layer size, `size_y` must be 1
    /// * `alloc` - Source of the weight and bias tensors
    pub fn populate(
        name: &str,
        prev: &dyn Layer,
        descr: &LayerDescr,
        alloc: &mut ParameterAllocator<'_>,
    ) -> Result<Self> {
        if descr.size_y != 1 || descr.size_x == 0 || descr.size_z == 0 {
            return Err(NetworkError::LayerConfiguration(format!(
                "fully connected layer {} must be a non-empty column (height 1)",
                name
            )));
        }
        let depth = descr.size_z;
        let grouped = if prev.depth() == depth && prev.height() == 1 {
            false
        } else if depth == 1 {
            true
        } else {
            return Err(NetworkError::LayerConfiguration(
                "depth mismatch between full layer and previous layer".to_string(),
            ));
        };
        let fan_in = if grouped { prev.size() } else { prev.width() };
        info!(
            "populating fully connected layer {} ({}x{}, {} inputs{})",
            name,
            descr.size_x,
            depth,
            fan_in,
            if grouped { ", grouped" } else { "" }
        );

        let weights = alloc.parameter(
            &format!("{}.weights", name),
            (descr.size_x, fan_in, 1, depth),
            Initializer::FanIn(fan_in),
        )?;
        let bias = alloc.parameter(
            &format!("{}.bias", name),
            (descr.size_x, 1, 1, depth),
            Initializer::Gaussian(1.0),
        )?;

        Ok(Self {
            name: name.to_string(),
            activation: descr.activation.unwrap_or_default(),
            grouped,
            fan_in,
            features: Tensor::new(descr.size_x, 1, 1, depth),
            errors: Tensor::new(descr.size_x, 1, 1, depth),
            weights,
            bias,
        })
    }

    /// Whether the predecessor is flattened before the product.
    pub fn is_grouped(&self) -> bool {
        self.grouped
    }

    fn input_of<'a>(&self, prev: &'a dyn Layer) -> Result<Cow<'a, Tensor>> {
        if self.grouped {
            Ok(Cow::Owned(group(prev.feature_maps())?))
        } else {
            Ok(Cow::Borrowed(prev.feature_maps()))
        }
    }
}

impl Layer for FullLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Full
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
        let input = self.input_of(prev)?;
        let mut output = muladd(&self.weights.value.read(), &input, &self.bias.value.read())?;
        self.activation.f(&mut output);
        self.features = output;
        Ok(())
    }

    fn back_propagate(&mut self, prev: Option<&mut dyn Layer>, _ctx: &TrainingContext) -> Result<()> {
        let Some(prev) = prev else {
            return Ok(());
        };
        if prev.error_maps().is_none() {
            return Ok(());
        }
        let mut update = multrans1(&self.weights.value.read(), &self.errors)?;
        if self.grouped {
            update = ungroup(&update, prev.feature_maps())?;
        }
        update.elemul_assign(&prev.activation_derivative())?;
        write_prev_error(prev, update)
    }

    fn update_gradients(&mut self, prev: Option<&dyn Layer>) -> Result<()> {
        let prev = predecessor(prev, &self.name)?;
        let input = self.input_of(prev)?;
        self.weights.accumulate(&multrans2(&self.errors, &input)?)?;
        self.bias.accumulate(&self.errors)
    }

    fn weights(&self) -> Option<&Parameter> {
        Some(&self.weights)
    }

    fn bias(&self) -> Option<&Parameter> {
        Some(&self.bias)
    }

    fn fan_in(&self) -> usize {
        self.fan_in
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
