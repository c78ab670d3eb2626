//! Convolutional layer.
//!
//! Filters are stored as a `(filter, filter, prev_depth, depth)` tensor: the
//! replication level walks the predecessor's feature maps. Padding is not
//! supported, so the layer must be exactly `prev - filter + 1` wide and high.

use super::{predecessor, write_prev_error, Layer, LayerDescr, LayerKind, TrainingContext};
use crate::error::{NetworkError, Result};
use crate::tensor::operation::{
    convolve_add_backward, convolve_add_forward, convolve_update, uniform_sum,
};
use crate::tensor::{ConvolutionMode, Initializer, Parameter, ParameterAllocator, Tensor};
use crate::utils::activations::Activation;
use log::info;
use std::any::Any;

const FILTER_STRIDE: usize = 1;

/// Convolutional layer with one filter bank per output feature map.
///
/// # Fields
///
/// * `filters` - `(filter, filter, prev_depth, depth)` kernels
/// * `bias` - One bias per output element
/// * `errors` - dL/d(pre-activation) of the last backward pass
pub struct ConvLayer {
    name: String,
    activation: Activation,
    filter_size: usize,
    fan_in: usize,
    features: Tensor,
    errors: Tensor,
    filters: Parameter,
    bias: Parameter,
}

impl ConvLayer {
    /// Build a convolutional layer on top of `prev`.
    ///
    /// # Arguments
    ///
    /// * `name` - Layer name, also the prefix of its parameter tensors
    /// * `prev` - Previous layer
    /// * `descr` - Output size and `filter_size`
    /// * `alloc` - Source of the filter and bias tensors
    ///
    /// # Errors
    ///
    /// `LayerConfiguration` when the output is not `prev - filter + 1` wide and high.
    pub fn populate(
        name: &str,
        prev: &dyn Layer,
        descr: &LayerDescr,
        alloc: &mut ParameterAllocator<'_>,
    ) -> Result<Self> {
        let filter_size = descr.filter_size.unwrap_or(0);
        if filter_size == 0
            || prev.width() < filter_size
            || prev.height() < filter_size
            || descr.size_x != prev.width() - filter_size + 1
            || descr.size_y != prev.height() - filter_size + 1
        {
            return Err(NetworkError::LayerConfiguration(
                "inconsistent convolutional layer size".to_string(),
            ));
        }
        let depth = descr.size_z;
        let fan_in = filter_size * filter_size * prev.depth();
        info!(
            "populating convolutional layer {} ({}x{}x{}, filter {})",
            name, descr.size_x, descr.size_y, depth, filter_size
        );

        let filters = alloc.parameter(
            &format!("{}.filters", name),
            (filter_size, filter_size, prev.depth(), depth),
            Initializer::FanIn(fan_in),
        )?;
        let bias = alloc.parameter(
            &format!("{}.bias", name),
            (descr.size_x, descr.size_y, 1, depth),
            Initializer::UniformPerMatrix(1.0),
        )?;

        Ok(Self {
            name: name.to_string(),
            activation: descr.activation.unwrap_or_default(),
            filter_size,
            fan_in,
            features: Tensor::new(descr.size_x, descr.size_y, 1, depth),
            errors: Tensor::new(descr.size_x, descr.size_y, 1, depth),
            filters,
            bias,
        })
    }

    /// Side of the square filters.
    pub fn filter_size(&self) -> usize {
        self.filter_size
    }
}

impl Layer for ConvLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Conv
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
        let mut output = convolve_add_forward(
            prev.feature_maps(),
            &self.filters.value.read(),
            FILTER_STRIDE,
            ConvolutionMode::FORWARD,
        )?;
        output.accumulate(&self.bias.value.read())?;
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
        let mut update = convolve_add_backward(
            &self.errors,
            &self.filters.value.read(),
            FILTER_STRIDE,
            ConvolutionMode::BACKWARD,
        )?;
        update.elemul_assign(&prev.activation_derivative())?;
        write_prev_error(prev, update)
    }

    fn update_gradients(&mut self, prev: Option<&dyn Layer>) -> Result<()> {
        let prev = predecessor(prev, &self.name)?;
        let mut gradient = convolve_update(
            prev.feature_maps(),
            &self.errors,
            FILTER_STRIDE,
            ConvolutionMode::UPDATE,
        )?;
        gradient /= self.depth() as f32;
        self.filters.accumulate(&gradient)?;
        self.bias.accumulate(&uniform_sum(&self.errors))
    }

    fn weights(&self) -> Option<&Parameter> {
        Some(&self.filters)
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
