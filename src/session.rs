//! Training session: the tensor registry and solver of one training run.

use crate::error::Result;
use crate::layers::LayerDescr;
use crate::network::Network;
use crate::solvers::SharedSolver;
use crate::tensor::{DeltaGroup, TensorTank};
use crate::utils::rng::NetworkRng;

/// Owns the state shared by every network of a training run.
///
/// Replicas built from the same session reference the same weight, bias and
/// solver cache tensors, and register their gradient deltas as cumulative
/// entries of the session's tank.
pub struct TrainingSession {
    solver: SharedSolver,
    tank: TensorTank,
}

impl TrainingSession {
    /// Start a session around `solver` with an empty tank.
    pub fn new(solver: SharedSolver) -> Self {
        Self {
            solver,
            tank: TensorTank::new(),
        }
    }

    pub fn solver(&self) -> &SharedSolver {
        &self.solver
    }

    /// Registry of the tensors shared by this session's replicas.
    pub fn tank(&self) -> &TensorTank {
        &self.tank
    }

    /// Build a standalone network using the session's solver.
    pub fn network(&self, topology: &[LayerDescr], rng: &mut NetworkRng) -> Result<Network> {
        Network::new(topology, self.solver.clone(), rng)
    }

    /// Build a network whose parameters are shared through the tank.
    ///
    /// The replica gets an accumulator group of its own, so its deltas are
    /// never summed with those of any other network.
    pub fn replica(&self, topology: &[LayerDescr], rng: &mut NetworkRng) -> Result<Network> {
        self.replica_in_group(topology, self.tank.new_group(), rng)
    }

    /// Build a shared network whose deltas join `group`.
    pub fn replica_in_group(
        &self,
        topology: &[LayerDescr],
        group: DeltaGroup,
        rng: &mut NetworkRng,
    ) -> Result<Network> {
        Network::shared_replica(topology, self, group, rng)
    }
}
