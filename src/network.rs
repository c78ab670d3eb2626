//! Sequential network of layers.
//!
//! A network walks its layers through the training cycle:
//!
//! ```text
//! clear_gradients → { set_input, set_output, feed_forward, back_propagate }* → gradient_descent
//! ```
//!
//! Layer `i` receives layer `i - 1` as its predecessor on every call; the
//! network's vector is the only owner of the layers.

use crate::error::{NetworkError, Result};
use crate::gradient_checker::{GradientCheckReport, LayerGradientReport};
use crate::layers::{
    ConvLayer, DropoutLayer, FullLayer, InputLayer, Layer, LayerDescr, LayerKind, OutputLayer,
    PoolLayer, TrainingContext,
};
use crate::session::TrainingSession;
use crate::solvers::SharedSolver;
use crate::tensor::{DeltaGroup, ParameterAllocator};
use crate::utils::rng::NetworkRng;
use log::{info, warn};

/// Perturbation used by the gradient check.
pub const GRADIENT_CHECK_EPSILON: f32 = 1e-3;
/// Absolute difference above which a gradient is reported.
pub const GRADIENT_CHECK_TOLERANCE: f32 = 1e-3;

/// Flat parameter buffers of one layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerParams {
    pub weights: Vec<f32>,
    pub bias: Vec<f32>,
}

/// Operations shared by the sequential and the parallel trainer.
pub trait NetworkInterface {
    fn set_training(&mut self, training: bool);

    fn is_training(&self) -> bool;

    /// Load a sample; its length must not exceed the input layer size.
    fn set_input(&mut self, data: &[f32]) -> Result<()>;

    /// Load a target; its length must not exceed the output layer size.
    fn set_output(&mut self, data: &[f32]) -> Result<()>;

    /// Output layer activations, `width * height * depth` values.
    fn output(&self) -> Vec<f32>;

    fn feed_forward(&mut self) -> Result<()>;

    fn back_propagate(&mut self) -> Result<()>;

    fn clear_gradients(&mut self) -> Result<()>;

    fn gradient_descent(&mut self) -> Result<()>;

    fn gradient_check(&mut self, reference_output: &[f32]) -> Result<GradientCheckReport>;

    fn count_layers(&self) -> usize;

    fn layer_params(&self, index: usize) -> Result<LayerParams>;

    fn set_layer_params(&mut self, index: usize, params: &LayerParams) -> Result<()>;

    /// Running mean loss of the backward passes since the last reset.
    fn mean_loss(&self) -> f32;

    fn reset_loss(&mut self);

    fn dump_weights(&self) -> String;

    fn dump_bias(&self) -> String;

    fn dump_activations(&self) -> String;
}

/// Sequential network of layers trained with a shared solver.
///
/// # Example
///
/// ```
/// use rust_convnet::layers::LayerDescr;
/// use rust_convnet::network::{Network, NetworkInterface};
/// use rust_convnet::solvers::{shared_solver, Sgd};
/// use rust_convnet::utils::rng::NetworkRng;
///
/// let topology = vec![LayerDescr::input(2, 1, 1), LayerDescr::output(1, 1, 1)];
/// let mut rng = NetworkRng::new(1);
/// let network = Network::new(&topology, shared_solver(Sgd::default()), &mut rng).unwrap();
/// assert_eq!(network.count_layers(), 2);
/// ```
pub struct Network {
    layers: Vec<Box<dyn Layer>>,
    context: TrainingContext,
    solver: SharedSolver,
    training_samples: usize,
}

fn validate_topology(topology: &[LayerDescr]) -> Result<()> {
    let invalid = |msg: &str| Err(NetworkError::LayerConfiguration(msg.to_string()));
    if topology.len() < 2 {
        return invalid("a network needs at least an input and an output layer");
    }
    if topology[0].kind != LayerKind::Input {
        return invalid("first layer must be an input layer");
    }
    if topology[topology.len() - 1].kind != LayerKind::Output {
        return invalid("last layer must be an output layer");
    }
    let inner = &topology[1..topology.len() - 1];
    if inner
        .iter()
        .any(|d| matches!(d.kind, LayerKind::Input | LayerKind::Output))
    {
        return invalid("input and output layers must be first and last");
    }
    Ok(())
}

impl Network {
    /// Build a network whose parameters are private to it.
    pub fn new(topology: &[LayerDescr], solver: SharedSolver, rng: &mut NetworkRng) -> Result<Self> {
        let cache_size = solver.lock().cache_size();
        let mut alloc = ParameterAllocator::private(rng, cache_size);
        Self::build(topology, solver, &mut alloc)
    }

    /// Build a replica whose parameters live in the session's tensor tank.
    ///
    /// # Arguments
    ///
    /// * `session` - Owner of the shared tensors and solver
    /// * `group` - Accumulator group the replica's gradient deltas join
    pub fn shared_replica(
        topology: &[LayerDescr],
        session: &TrainingSession,
        group: DeltaGroup,
        rng: &mut NetworkRng,
    ) -> Result<Self> {
        let solver = session.solver().clone();
        let cache_size = solver.lock().cache_size();
        let mut alloc = ParameterAllocator::shared(session.tank(), group, rng, cache_size);
        Self::build(topology, solver, &mut alloc)
    }

    fn build(
        topology: &[LayerDescr],
        solver: SharedSolver,
        alloc: &mut ParameterAllocator<'_>,
    ) -> Result<Self> {
        validate_topology(topology)?;
        let mut layers: Vec<Box<dyn Layer>> = Vec::with_capacity(topology.len());
        for (index, descr) in topology.iter().enumerate() {
            let name = format!("{}{}", descr.kind.prefix(), index);
            let layer: Box<dyn Layer> = match layers.last() {
                None => Box::new(InputLayer::populate(&name, descr)?),
                Some(prev) => {
                    let prev: &dyn Layer = &**prev;
                    match descr.kind {
                        LayerKind::Conv => Box::new(ConvLayer::populate(&name, prev, descr, alloc)?),
                        LayerKind::Pool => Box::new(PoolLayer::populate(&name, prev, descr)?),
                        LayerKind::Dropout => {
                            Box::new(DropoutLayer::populate(&name, prev, descr, alloc.rng())?)
                        }
                        LayerKind::Full => Box::new(FullLayer::populate(&name, prev, descr, alloc)?),
                        LayerKind::Output => {
                            Box::new(OutputLayer::populate(&name, prev, descr, alloc)?)
                        }
                        LayerKind::Input => {
                            return Err(NetworkError::LayerConfiguration(
                                "unexpected input layer".to_string(),
                            ))
                        }
                    }
                }
            };
            layers.push(layer);
        }
        info!("network populated with {} layers", layers.len());
        Ok(Self {
            layers,
            context: TrainingContext::inference(),
            solver,
            training_samples: 0,
        })
    }

    /// Layer at `index`, input layer first.
    pub fn layer(&self, index: usize) -> Option<&dyn Layer> {
        self.layers.get(index).map(|l| &**l as &dyn Layer)
    }

    pub fn layers(&self) -> impl Iterator<Item = &dyn Layer> {
        self.layers.iter().map(|l| &**l as &dyn Layer)
    }

    /// Solver applied by `gradient_descent`.
    pub fn solver(&self) -> &SharedSolver {
        &self.solver
    }

    /// Current training or inference mode.
    pub fn context(&self) -> TrainingContext {
        self.context
    }

    /// Samples accumulated since the last `clear_gradients`.
    pub fn training_samples(&self) -> usize {
        self.training_samples
    }

    pub(crate) fn set_training_samples(&mut self, samples: usize) {
        self.training_samples = samples;
    }

    fn input_layer_mut(&mut self) -> Result<&mut InputLayer> {
        self.layers
            .first_mut()
            .and_then(|l| l.as_any_mut().downcast_mut::<InputLayer>())
            .ok_or_else(|| NetworkError::LayerConfiguration("missing input layer".to_string()))
    }

    fn output_layer(&self) -> Result<&OutputLayer> {
        self.layers
            .last()
            .and_then(|l| l.as_any().downcast_ref::<OutputLayer>())
            .ok_or_else(|| NetworkError::LayerConfiguration("missing output layer".to_string()))
    }

    fn output_layer_mut(&mut self) -> Result<&mut OutputLayer> {
        self.layers
            .last_mut()
            .and_then(|l| l.as_any_mut().downcast_mut::<OutputLayer>())
            .ok_or_else(|| NetworkError::LayerConfiguration("missing output layer".to_string()))
    }

    /// `(sum, count)` of the losses recorded by the output layer.
    pub fn loss_stats(&self) -> (f64, usize) {
        self.output_layer().map_or((0.0, 0), OutputLayer::loss_stats)
    }

    /// Loss of the current output against the current target.
    pub fn current_loss(&self) -> Result<f32> {
        self.output_layer()?.current_loss()
    }

    fn dump_with<F>(&self, title: &str, f: F) -> String
    where
        F: Fn(&dyn Layer) -> Option<String>,
    {
        let mut out = String::new();
        for layer in self.layers() {
            if let Some(text) = f(layer) {
                out.push_str(&format!("{} {}\n{}", title, layer.name(), text));
            }
        }
        out
    }
}

impl NetworkInterface for Network {
    fn set_training(&mut self, training: bool) {
        self.context.training = training;
    }

    fn is_training(&self) -> bool {
        self.context.training
    }

    fn set_input(&mut self, data: &[f32]) -> Result<()> {
        self.input_layer_mut()?.fill(data)
    }

    fn set_output(&mut self, data: &[f32]) -> Result<()> {
        self.output_layer_mut()?.fill_output(data)
    }

    fn output(&self) -> Vec<f32> {
        self.layers
            .last()
            .map(|l| l.feature_maps().grouped_data())
            .unwrap_or_default()
    }

    fn feed_forward(&mut self) -> Result<()> {
        for index in 0..self.layers.len() {
            let (before, rest) = self.layers.split_at_mut(index);
            let prev = before.last().map(|l| &**l as &dyn Layer);
            rest[0].feed_forward(prev, &self.context)?;
        }
        Ok(())
    }

    fn back_propagate(&mut self) -> Result<()> {
        for index in (0..self.layers.len()).rev() {
            let (before, rest) = self.layers.split_at_mut(index);
            let prev = before.last_mut().map(|l| &mut **l as &mut dyn Layer);
            rest[0].back_propagate(prev, &self.context)?;
        }
        for index in 1..self.layers.len() {
            let (before, rest) = self.layers.split_at_mut(index);
            let prev = before.last().map(|l| &**l as &dyn Layer);
            rest[0].update_gradients(prev)?;
        }
        self.training_samples += 1;
        Ok(())
    }

    fn clear_gradients(&mut self) -> Result<()> {
        self.training_samples = 0;
        for layer in self.layers.iter_mut() {
            layer.clear_gradients();
        }
        Ok(())
    }

    fn gradient_descent(&mut self) -> Result<()> {
        let mut solver = self.solver.lock();
        solver.set_size(self.training_samples)?;
        for layer in self.layers.iter_mut() {
            layer.gradient_descent(&*solver)?;
        }
        Ok(())
    }

    /// Compare accumulated weight gradients with central differences.
    ///
    /// Discrepancies are logged and reported, never raised. Gradients are
    /// cleared on return.
    fn gradient_check(&mut self, reference_output: &[f32]) -> Result<GradientCheckReport> {
        self.set_output(reference_output)?;

        let mut numeric: Vec<(usize, Vec<f32>)> = Vec::new();
        for index in 0..self.layers.len() {
            let Some(mut checker) = self.layers[index].gradient_checker() else {
                continue;
            };
            let mut grads = Vec::with_capacity(checker.size());
            loop {
                checker.store();
                checker.modify(GRADIENT_CHECK_EPSILON);
                self.feed_forward()?;
                let loss_plus = self.current_loss()?;
                checker.modify(-GRADIENT_CHECK_EPSILON);
                self.feed_forward()?;
                let loss_minus = self.current_loss()?;
                checker.restore();
                grads.push((loss_plus - loss_minus) / (2.0 * GRADIENT_CHECK_EPSILON));
                if !checker.next() {
                    break;
                }
            }
            numeric.push((index, grads));
        }

        self.clear_gradients()?;
        self.feed_forward()?;
        self.back_propagate()?;

        let mut report = GradientCheckReport::default();
        for (index, grads) in numeric {
            let layer = &self.layers[index];
            let Some(mut checker) = layer.gradient_checker() else {
                continue;
            };
            let mut layer_report = LayerGradientReport {
                layer: layer.name().to_string(),
                parameters: grads.len(),
                max_abs_error: 0.0,
                max_relative_error: 0.0,
                discrepancies: 0,
            };
            for grad in grads {
                checker.set_grad(grad);
                let abs_error = checker.abs_error();
                layer_report.max_abs_error = layer_report.max_abs_error.max(abs_error);
                layer_report.max_relative_error = layer_report.max_relative_error.max(checker.error());
                if abs_error > GRADIENT_CHECK_TOLERANCE {
                    let (x, y, d1, d2) = checker.position();
                    warn!(
                        "gradient check {} [{},{},{},{}]: analytic {} numeric {} (relative error {})",
                        layer.name(),
                        x,
                        y,
                        d1,
                        d2,
                        checker.analytic(),
                        checker.numeric(),
                        checker.error()
                    );
                    layer_report.discrepancies += 1;
                }
                checker.next();
            }
            info!(
                "gradient check {}: max abs error {}, {} discrepancies",
                layer_report.layer, layer_report.max_abs_error, layer_report.discrepancies
            );
            report.layers.push(layer_report);
        }

        self.clear_gradients()?;
        self.reset_loss();
        Ok(report)
    }

    fn count_layers(&self) -> usize {
        self.layers.len()
    }

    fn layer_params(&self, index: usize) -> Result<LayerParams> {
        let layer = self.layer(index).ok_or(NetworkError::InvalidLayerIndex)?;
        let flat = |p: Option<&crate::tensor::Parameter>| {
            p.map(|p| p.value.read().grouped_data()).unwrap_or_default()
        };
        Ok(LayerParams {
            weights: flat(layer.weights()),
            bias: flat(layer.bias()),
        })
    }

    fn set_layer_params(&mut self, index: usize, params: &LayerParams) -> Result<()> {
        let layer = self
            .layers
            .get_mut(index)
            .ok_or(NetworkError::InvalidLayerIndex)?;
        if params.weights.len() != layer.nb_weights() || params.bias.len() != layer.nb_bias() {
            return Err(NetworkError::InconsistentLayerSize);
        }
        layer.fill_w(&params.weights)?;
        layer.fill_b(&params.bias)
    }

    fn mean_loss(&self) -> f32 {
        self.output_layer().map_or(0.0, OutputLayer::mean_loss)
    }

    fn reset_loss(&mut self) {
        if let Ok(output) = self.output_layer_mut() {
            output.reset_loss();
        }
    }

    fn dump_weights(&self) -> String {
        self.dump_with("weights", |l| l.weights().map(|p| p.value.read().to_string()))
    }

    fn dump_bias(&self) -> String {
        self.dump_with("bias", |l| l.bias().map(|p| p.value.read().to_string()))
    }

    fn dump_activations(&self) -> String {
        self.dump_with("activations", |l| Some(l.feature_maps().to_string()))
    }
}
