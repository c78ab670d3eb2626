//! Named registry of tensors shared between network replicas.
//!
//! Trainable layers ask an allocator for their parameters. Without a tank
//! every tensor is private to the layer. With a tank, weights, biases and
//! solver caches are looked up by name so that every replica references the
//! same instance, while gradient deltas are registered as "cumulative"
//! entries: one private tensor per replica, summed on [`TensorTank::accumulate`].
//!
//! Cumulative entries are partitioned into groups. Each group is one set of
//! replicas trained together; accumulating or clearing a group never touches
//! the deltas of another group.

use super::Tensor;
use crate::error::{NetworkError, Result};
use crate::solvers::Solver;
use crate::utils::rng::NetworkRng;
use log::debug;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Tensor that may be referenced by several layers across threads.
pub type SharedTensor = Arc<RwLock<Tensor>>;

/// Identifier of a set of replicas whose deltas are summed together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeltaGroup(usize);

/// Wrap `tensor` so it can be handed to several layers.
pub fn shared(tensor: Tensor) -> SharedTensor {
    Arc::new(RwLock::new(tensor))
}

fn tank_key(name: &str, shape: (usize, usize, usize, usize)) -> String {
    format!("{}/{}x{}x{}x{}", name, shape.0, shape.1, shape.2, shape.3)
}

#[derive(Debug, Default)]
pub struct TensorTank {
    shared: Mutex<HashMap<String, SharedTensor>>,
    cumulative: Mutex<HashMap<DeltaGroup, HashMap<String, Vec<SharedTensor>>>>,
    next_group: AtomicUsize,
}

impl TensorTank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the tensor registered under `name`, creating a zeroed one if
    /// needed. The flag tells whether this call created it.
    pub fn get_shared(
        &self,
        name: &str,
        shape: (usize, usize, usize, usize),
    ) -> (SharedTensor, bool) {
        let mut entries = self.shared.lock();
        let key = tank_key(name, shape);
        if let Some(existing) = entries.get(&key) {
            return (Arc::clone(existing), false);
        }
        let tensor = shared(Tensor::new(shape.0, shape.1, shape.2, shape.3));
        entries.insert(key, Arc::clone(&tensor));
        (tensor, true)
    }

    /// Reserve a fresh accumulator group.
    pub fn new_group(&self) -> DeltaGroup {
        DeltaGroup(self.next_group.fetch_add(1, Ordering::Relaxed))
    }

    /// Register a new accumulator under `name` in `group` and return it.
    ///
    /// The first accumulator registered for a name within a group is the
    /// canonical one of that group.
    pub fn get_cumulative(
        &self,
        group: DeltaGroup,
        name: &str,
        shape: (usize, usize, usize, usize),
    ) -> SharedTensor {
        let tensor = shared(Tensor::new(shape.0, shape.1, shape.2, shape.3));
        self.cumulative
            .lock()
            .entry(group)
            .or_default()
            .entry(tank_key(name, shape))
            .or_default()
            .push(Arc::clone(&tensor));
        tensor
    }

    /// Sum every accumulator of `group` into its canonical one and zero the
    /// others.
    pub fn accumulate(&self, group: DeltaGroup) -> Result<()> {
        let groups = self.cumulative.lock();
        let Some(entries) = groups.get(&group) else {
            return Ok(());
        };
        for (key, replicas) in entries.iter() {
            let Some((canonical, others)) = replicas.split_first() else {
                continue;
            };
            let mut total = canonical.write();
            for other in others {
                let mut delta = other.write();
                total.accumulate(&delta)?;
                delta.clear();
            }
            debug!("accumulated {} replicas into {}", replicas.len(), key);
        }
        Ok(())
    }

    /// Zero every accumulator of `group`.
    pub fn clear_cumulative(&self, group: DeltaGroup) {
        if let Some(entries) = self.cumulative.lock().get(&group) {
            for tensor in entries.values().flatten() {
                tensor.write().clear();
            }
        }
    }

    /// Number of distinct shared tensors, caches included.
    pub fn shared_count(&self) -> usize {
        self.shared.lock().len()
    }

    /// Number of accumulators registered under `name` with the given shape
    /// in `group`.
    pub fn cumulative_count(
        &self,
        group: DeltaGroup,
        name: &str,
        shape: (usize, usize, usize, usize),
    ) -> usize {
        self.cumulative
            .lock()
            .get(&group)
            .and_then(|entries| entries.get(&tank_key(name, shape)))
            .map_or(0, Vec::len)
    }
}

/// How a freshly created parameter tensor is initialized.
#[derive(Debug, Clone, Copy)]
pub enum Initializer {
    Zero,
    /// Gaussian with stddev `1/sqrt(fan_in)` per element.
    FanIn(usize),
    /// One gaussian draw with the given stddev per matrix.
    UniformPerMatrix(f32),
    /// Gaussian with the given stddev per element.
    Gaussian(f32),
}

/// Trainable tensor with its solver caches and gradient accumulator.
#[derive(Debug, Clone)]
pub struct Parameter {
    pub value: SharedTensor,
    pub cache: Vec<SharedTensor>,
    pub delta: SharedTensor,
}

impl Parameter {
    pub fn shape(&self) -> (usize, usize, usize, usize) {
        self.value.read().shape()
    }

    pub fn size(&self) -> usize {
        self.value.read().size()
    }

    /// Add `gradient` to the accumulated delta.
    pub fn accumulate(&self, gradient: &Tensor) -> Result<()> {
        self.delta.write().accumulate(gradient)
    }

    /// Zero the accumulated delta.
    pub fn clear_delta(&self) {
        self.delta.write().clear();
    }

    /// Apply one solver step from the accumulated delta.
    ///
    /// `redux` selects the bias variant of the update rule.
    pub fn descend(&self, solver: &dyn Solver, redux: bool) -> Result<()> {
        let mut value = self.value.write();
        let delta = self.delta.read();
        let mut guards: Vec<_> = self.cache.iter().map(|c| c.write()).collect();
        let mut caches: Vec<&mut Tensor> = guards.iter_mut().map(|g| &mut **g).collect();
        if redux {
            solver.update_redux(&mut value, &mut caches, &delta)
        } else {
            solver.update(&mut value, &mut caches, &delta)
        }
    }

    /// Overwrite the values from a flat buffer of exactly the tensor size.
    pub fn fill(&self, data: &[f32]) -> Result<()> {
        let mut value = self.value.write();
        if data.len() != value.size() {
            return Err(NetworkError::InconsistentLayerSize);
        }
        value.grouped_fill(data)
    }
}

/// Hands out parameter tensors to layers being populated.
pub struct ParameterAllocator<'a> {
    tank: Option<(&'a TensorTank, DeltaGroup)>,
    rng: &'a mut NetworkRng,
    cache_size: usize,
}

impl<'a> ParameterAllocator<'a> {
    /// Allocator producing tensors owned by a single network.
    pub fn private(rng: &'a mut NetworkRng, cache_size: usize) -> Self {
        Self {
            tank: None,
            rng,
            cache_size,
        }
    }

    /// Allocator sharing values and caches through `tank`, registering its
    /// deltas in `group`.
    pub fn shared(
        tank: &'a TensorTank,
        group: DeltaGroup,
        rng: &'a mut NetworkRng,
        cache_size: usize,
    ) -> Self {
        Self {
            tank: Some((tank, group)),
            rng,
            cache_size,
        }
    }

    /// Generator used for initialization, also lent to dropout layers.
    pub fn rng(&mut self) -> &mut NetworkRng {
        self.rng
    }

    fn initialize(&mut self, tensor: &mut Tensor, init: Initializer) {
        match init {
            Initializer::Zero => tensor.clear(),
            Initializer::FanIn(fan_in) => tensor.fill_random(self.rng, fan_in),
            Initializer::UniformPerMatrix(stddev) => tensor.uniform_fill_random(self.rng, stddev),
            Initializer::Gaussian(stddev) => {
                for value in tensor.data_mut() {
                    *value = self.rng.gaussian(0.0, stddev);
                }
            }
        }
    }

    fn value(
        &mut self,
        name: &str,
        shape: (usize, usize, usize, usize),
        init: Initializer,
    ) -> SharedTensor {
        match self.tank {
            Some((tank, _)) => {
                let (tensor, created) = tank.get_shared(name, shape);
                if created {
                    self.initialize(&mut tensor.write(), init);
                }
                tensor
            }
            None => {
                let mut tensor = Tensor::new(shape.0, shape.1, shape.2, shape.3);
                self.initialize(&mut tensor, init);
                shared(tensor)
            }
        }
    }

    /// Allocate a parameter named `name` with its caches and delta.
    pub fn parameter(
        &mut self,
        name: &str,
        shape: (usize, usize, usize, usize),
        init: Initializer,
    ) -> Result<Parameter> {
        if shape.0 * shape.1 * shape.2 * shape.3 == 0 {
            return Err(NetworkError::LayerConfiguration(format!(
                "empty parameter tensor {}",
                name
            )));
        }
        let value = self.value(name, shape, init);
        let cache = (0..self.cache_size)
            .map(|i| self.value(&format!("{}.cache{}", name, i), shape, Initializer::Zero))
            .collect();
        let delta = match self.tank {
            Some((tank, group)) => tank.get_cumulative(group, &format!("{}.delta", name), shape),
            None => shared(Tensor::new(shape.0, shape.1, shape.2, shape.3)),
        };
        Ok(Parameter {
            value,
            cache,
            delta,
        })
    }
}
