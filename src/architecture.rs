//! Architecture configuration.
//!
//! A network topology can be described in JSON and turned into the
//! [`LayerDescr`] list consumed by [`Network`] and [`NetworkParallel`].
//!
//! [`NetworkParallel`]: crate::network_parallel::NetworkParallel

use crate::error::{NetworkError, Result};
use crate::layers::{LayerDescr, LayerKind};
use crate::network::Network;
use crate::session::TrainingSession;
use crate::utils::activations::Activation;
use crate::utils::loss::Loss;
use crate::utils::rng::NetworkRng;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Configuration for a single layer.
///
/// Required fields depend on the layer type:
///
/// - **input**, **pool**, **dropout**, **full**, **output**: `size_x`, `size_y`, `size_z`
/// - **conv**: the sizes plus `filter_size`
///
/// `activation` applies to conv, full and output layers, `loss` to the
/// output layer and `dropout_rate` to dropout layers.
///
/// # Examples
///
/// ```json
/// {
///   "layer_type": "conv",
///   "size_x": 24,
///   "size_y": 24,
///   "size_z": 6,
///   "filter_size": 5,
///   "activation": "relu"
/// }
/// ```
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LayerConfig {
    /// "input", "conv", "pool", "dropout", "full" or "output"
    pub layer_type: String,

    pub size_x: usize,

    #[serde(default = "one")]
    pub size_y: usize,

    #[serde(default = "one")]
    pub size_z: usize,

    pub filter_size: Option<usize>,

    pub activation: Option<String>,

    pub loss: Option<String>,

    pub dropout_rate: Option<f32>,
}

fn one() -> usize {
    1
}

/// Layers in forward order: an input layer first, an output layer last.
///
/// # Example
///
/// ```json
/// {
///   "layers": [
///     { "layer_type": "input", "size_x": 28, "size_y": 28 },
///     { "layer_type": "conv", "size_x": 24, "size_y": 24, "size_z": 6, "filter_size": 5 },
///     { "layer_type": "pool", "size_x": 12, "size_y": 12, "size_z": 6 },
///     { "layer_type": "full", "size_x": 100 },
///     { "layer_type": "output", "size_x": 10, "activation": "softmax", "loss": "cross_entropy" }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ArchitectureConfig {
    pub layers: Vec<LayerConfig>,
}

/// Loads an architecture configuration from a JSON file and validates it.
///
/// ```no_run
/// use rust_convnet::architecture::load_architecture;
///
/// let arch = load_architecture("config/architectures/lenet.json").unwrap();
/// assert!(!arch.layers.is_empty());
/// ```
pub fn load_architecture<P: AsRef<Path>>(path: P) -> Result<ArchitectureConfig> {
    let contents = fs::read_to_string(path)?;
    parse_architecture(&contents)
}

pub fn parse_architecture(json: &str) -> Result<ArchitectureConfig> {
    let config: ArchitectureConfig = serde_json::from_str(json)?;
    validate_architecture(&config)?;
    Ok(config)
}

fn invalid<T>(index: usize, msg: impl AsRef<str>) -> Result<T> {
    Err(NetworkError::InvalidConfig(format!(
        "Layer {}: {}",
        index,
        msg.as_ref()
    )))
}

/// Turn one layer configuration into a descriptor.
fn layer_descr(layer: &LayerConfig, index: usize) -> Result<LayerDescr> {
    let kind = match LayerKind::from_name(&layer.layer_type) {
        Some(kind) => kind,
        None => return invalid(index, format!("unknown layer type '{}'", layer.layer_type)),
    };
    if layer.size_x == 0 || layer.size_y == 0 || layer.size_z == 0 {
        return invalid(index, "sizes must be greater than 0");
    }

    let mut descr = LayerDescr::new(kind, layer.size_x, layer.size_y, layer.size_z);
    match kind {
        LayerKind::Conv => match layer.filter_size {
            Some(size) if size > 0 => descr.filter_size = Some(size),
            _ => return invalid(index, "conv layer requires a positive 'filter_size'"),
        },
        LayerKind::Dropout => {
            if let Some(rate) = layer.dropout_rate {
                if !(0.0..1.0).contains(&rate) {
                    return invalid(index, "dropout_rate must be in [0.0, 1.0)");
                }
            }
            descr.dropout_rate = layer.dropout_rate;
        }
        _ => {}
    }

    if let Some(name) = &layer.activation {
        match Activation::from_name(name) {
            Some(activation) => descr.activation = Some(activation),
            None => return invalid(index, format!("unknown activation '{}'", name)),
        }
    }
    if let Some(name) = &layer.loss {
        if kind != LayerKind::Output {
            return invalid(index, "only the output layer takes a loss");
        }
        match Loss::from_name(name) {
            Some(loss) => descr.loss = Some(loss),
            None => return invalid(index, format!("unknown loss '{}'", name)),
        }
    }
    Ok(descr)
}

/// Check that `next` can follow `prev`: convolution and pooling windows
/// must tile the predecessor, and full layers are a single row.
fn validate_connection(prev: &LayerDescr, next: &LayerDescr, index: usize) -> Result<()> {
    match next.kind {
        LayerKind::Conv => {
            let filter = next.filter_size.unwrap_or(0);
            if prev.size_x < filter
                || prev.size_y < filter
                || next.size_x != prev.size_x - filter + 1
                || next.size_y != prev.size_y - filter + 1
            {
                return invalid(
                    index,
                    format!(
                        "conv output {}x{} does not match input {}x{} with filter {}",
                        next.size_x, next.size_y, prev.size_x, prev.size_y, filter
                    ),
                );
            }
        }
        LayerKind::Pool => {
            if prev.size_x % next.size_x != 0
                || prev.size_y != next.size_y * (prev.size_x / next.size_x)
            {
                return invalid(index, "pooling window does not tile the previous layer");
            }
            if prev.size_z != next.size_z {
                return invalid(index, "pooling layer depth must match the previous layer");
            }
        }
        LayerKind::Dropout => {
            if (prev.size_x, prev.size_y, prev.size_z) != (next.size_x, next.size_y, next.size_z)
            {
                return invalid(index, "dropout layer must match the previous layer size");
            }
        }
        LayerKind::Full | LayerKind::Output => {
            if next.size_y != 1 {
                return invalid(index, "fully connected layers must have size_y = 1");
            }
            let aligned = prev.size_z == next.size_z && prev.size_y == 1;
            if !aligned && next.size_z != 1 {
                return invalid(index, "depth mismatch between full layer and previous layer");
            }
        }
        LayerKind::Input => return invalid(index, "input layer must come first"),
    }
    Ok(())
}

/// Validates an architecture configuration.
///
/// Checks that:
/// - the first layer is an input layer and the last an output layer
/// - each layer has the fields its type requires
/// - each layer's size is compatible with its predecessor
pub fn validate_architecture(config: &ArchitectureConfig) -> Result<()> {
    build_topology(config).map(|_| ())
}

/// Convert a configuration into the topology a network is built from.
pub fn build_topology(config: &ArchitectureConfig) -> Result<Vec<LayerDescr>> {
    if config.layers.len() < 2 {
        return Err(NetworkError::InvalidConfig(
            "Architecture needs at least an input and an output layer".to_string(),
        ));
    }
    let last = config.layers.len() - 1;
    let mut topology: Vec<LayerDescr> = Vec::with_capacity(config.layers.len());
    for (index, layer) in config.layers.iter().enumerate() {
        let descr = layer_descr(layer, index)?;
        let expected_input = index == 0;
        if (descr.kind == LayerKind::Input) != expected_input {
            return invalid(index, "the input layer must be the first and only input layer");
        }
        if (descr.kind == LayerKind::Output) != (index == last) {
            return invalid(index, "the output layer must be the last and only output layer");
        }
        if let Some(prev) = topology.last() {
            validate_connection(prev, &descr, index)?;
        }
        topology.push(descr);
    }
    Ok(topology)
}

/// Build a network from a configuration inside a training session.
pub fn build_network(
    config: &ArchitectureConfig,
    session: &TrainingSession,
    rng: &mut NetworkRng,
) -> Result<Network> {
    let topology = build_topology(config)?;
    session.network(&topology, rng)
}
