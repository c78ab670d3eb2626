//! Network layers.
//!
//! Each layer owns its feature maps and, except for the input layer, its
//! error maps. Error maps hold the gradient of the loss with respect to the
//! layer's pre-activation values; they are written by the successor layer
//! (or by the output layer itself from the target).
//!
//! Layers never own their predecessor: the network passes it to every call.

mod r#trait;
pub mod conv;
pub mod dropout;
pub mod full;
pub mod input;
pub mod output;
pub mod pool;

pub use conv::ConvLayer;
pub use dropout::DropoutLayer;
pub use full::FullLayer;
pub use input::InputLayer;
pub use output::OutputLayer;
pub use pool::PoolLayer;
pub use r#trait::Layer;

use crate::error::{NetworkError, Result};
use crate::utils::activations::Activation;
use crate::utils::loss::Loss;

/// Per-network training flag threaded through forward and backward calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrainingContext {
    pub training: bool,
}

impl TrainingContext {
    pub fn training() -> Self {
        Self { training: true }
    }

    pub fn inference() -> Self {
        Self { training: false }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Input,
    Conv,
    Pool,
    Dropout,
    Full,
    Output,
}

impl LayerKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "input" => Some(Self::Input),
            "conv" | "convolutional" => Some(Self::Conv),
            "pool" | "max_pool" | "subsampling" => Some(Self::Pool),
            "dropout" => Some(Self::Dropout),
            "full" | "dense" | "fully_connected" => Some(Self::Full),
            "output" => Some(Self::Output),
            _ => None,
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Conv => "conv",
            Self::Pool => "pool",
            Self::Dropout => "dropout",
            Self::Full => "full",
            Self::Output => "output",
        }
    }
}

/// One entry of a network topology.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerDescr {
    pub kind: LayerKind,
    pub size_x: usize,
    pub size_y: usize,
    pub size_z: usize,
    pub filter_size: Option<usize>,
    pub activation: Option<Activation>,
    pub loss: Option<Loss>,
    pub dropout_rate: Option<f32>,
}

impl LayerDescr {
    pub fn new(kind: LayerKind, size_x: usize, size_y: usize, size_z: usize) -> Self {
        Self {
            kind,
            size_x,
            size_y,
            size_z,
            filter_size: None,
            activation: None,
            loss: None,
            dropout_rate: None,
        }
    }

    pub fn input(size_x: usize, size_y: usize, size_z: usize) -> Self {
        Self::new(LayerKind::Input, size_x, size_y, size_z)
    }

    pub fn conv(size_x: usize, size_y: usize, size_z: usize, filter_size: usize) -> Self {
        Self {
            filter_size: Some(filter_size),
            ..Self::new(LayerKind::Conv, size_x, size_y, size_z)
        }
    }

    pub fn pool(size_x: usize, size_y: usize, size_z: usize) -> Self {
        Self::new(LayerKind::Pool, size_x, size_y, size_z)
    }

    pub fn dropout(size_x: usize, size_y: usize, size_z: usize, rate: f32) -> Self {
        Self {
            dropout_rate: Some(rate),
            ..Self::new(LayerKind::Dropout, size_x, size_y, size_z)
        }
    }

    pub fn full(size_x: usize, size_y: usize, size_z: usize) -> Self {
        Self::new(LayerKind::Full, size_x, size_y, size_z)
    }

    pub fn output(size_x: usize, size_y: usize, size_z: usize) -> Self {
        Self::new(LayerKind::Output, size_x, size_y, size_z)
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = Some(activation);
        self
    }

    pub fn with_loss(mut self, loss: Loss) -> Self {
        self.loss = Some(loss);
        self
    }

    pub fn size(&self) -> usize {
        self.size_x * self.size_y * self.size_z
    }
}

/// Predecessor of a non-input layer, or a configuration error.
pub(crate) fn predecessor<'a>(prev: Option<&'a dyn Layer>, name: &str) -> Result<&'a dyn Layer> {
    prev.ok_or_else(|| NetworkError::LayerConfiguration(format!("layer {} has no predecessor", name)))
}

/// Store `update` into the predecessor's error maps, if it has any.
pub(crate) fn write_prev_error(prev: &mut dyn Layer, update: crate::tensor::Tensor) -> Result<()> {
    if let Some(error) = prev.error_maps_mut() {
        if !error.same_shape(&update) {
            return Err(NetworkError::InconsistentSize("back_propagate"));
        }
        *error = update;
    }
    Ok(())
}
