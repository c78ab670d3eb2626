//! Multi-replica trainer.
//!
//! `N` replicas share their trainable tensors through a [`TrainingSession`].
//! In training mode every `feed_forward` queues one job that loads the staged
//! sample into the next replica (round-robin) and runs its forward and
//! backward passes under the replica's mutex. `gradient_descent` waits for
//! the queue to drain, sums every replica's deltas into the canonical ones
//! and applies a single solver step through replica 0.
//!
//! Shared weights are only written after the queue has drained, so replicas
//! only ever read them concurrently.

use crate::error::{NetworkError, Result};
use crate::gradient_checker::GradientCheckReport;
use crate::layers::LayerDescr;
use crate::network::{LayerParams, Network, NetworkInterface};
use crate::session::TrainingSession;
use crate::tensor::DeltaGroup;
use crate::utils::rng::NetworkRng;
use crate::utils::thread_pool::ThreadPool;
use log::{debug, info};
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Upper bound on the number of replicas, and so on worker threads.
pub const MAX_PARALLEL_REPLICAS: usize = 8;

type Replica = Arc<Mutex<Network>>;

/// Data-parallel trainer driving several replicas of one network.
///
/// Implements [`NetworkInterface`], so trainers use it like a single
/// [`Network`]. Outside training mode every call goes to replica 0.
pub struct NetworkParallel {
    session: Arc<TrainingSession>,
    group: DeltaGroup,
    replicas: Vec<Replica>,
    pool: ThreadPool,
    training: bool,
    cursor: usize,
    staged_input: Vec<f32>,
    staged_output: Vec<f32>,
    input_capacity: usize,
    output_capacity: usize,
    job_error: Arc<Mutex<Option<NetworkError>>>,
}

impl NetworkParallel {
    /// Build `replica_count` replicas of `topology` sharing their parameters
    /// through `session`.
    ///
    /// # Arguments
    ///
    /// * `topology` - Layer descriptions, input first and output last
    /// * `replica_count` - Number of replicas and worker threads, at most
    ///   [`MAX_PARALLEL_REPLICAS`]
    /// * `session` - Owner of the shared tensors and solver
    /// * `rng` - Generator for parameter initialization
    ///
    /// # Errors
    ///
    /// `ReplicaLimit` above the cap, `InvalidConfig` for zero replicas, and any
    /// topology error.
    pub fn new(
        topology: &[LayerDescr],
        replica_count: usize,
        session: Arc<TrainingSession>,
        rng: &mut NetworkRng,
    ) -> Result<Self> {
        if replica_count == 0 {
            return Err(NetworkError::InvalidConfig(
                "at least one replica is required".to_string(),
            ));
        }
        if replica_count > MAX_PARALLEL_REPLICAS {
            return Err(NetworkError::ReplicaLimit {
                requested: replica_count,
                max: MAX_PARALLEL_REPLICAS,
            });
        }
        let group = session.tank().new_group();
        let replicas = (0..replica_count)
            .map(|_| {
                session
                    .replica_in_group(topology, group, rng)
                    .map(|n| Arc::new(Mutex::new(n)))
            })
            .collect::<Result<Vec<_>>>()?;
        let input_capacity = topology.first().map_or(0, LayerDescr::size);
        let output_capacity = topology.last().map_or(0, LayerDescr::size);
        info!("parallel trainer started with {} replicas", replica_count);
        Ok(Self {
            session,
            group,
            replicas,
            pool: ThreadPool::new(replica_count),
            training: false,
            cursor: 0,
            staged_input: Vec::new(),
            staged_output: Vec::new(),
            input_capacity,
            output_capacity,
            job_error: Arc::new(Mutex::new(None)),
        })
    }

    pub fn replica_count(&self) -> usize {
        self.replicas.len()
    }

    pub fn session(&self) -> &Arc<TrainingSession> {
        &self.session
    }

    fn primary(&self) -> &Replica {
        &self.replicas[0]
    }

    /// Block until every queued job has run.
    pub fn wait_all(&self) {
        self.pool.wait_all();
    }

    fn take_job_error(&self) -> Result<()> {
        match self.job_error.lock().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn dispatch(&mut self) {
        let replica = Arc::clone(&self.replicas[self.cursor]);
        self.cursor = (self.cursor + 1) % self.replicas.len();
        let input = self.staged_input.clone();
        let output = self.staged_output.clone();
        let job_error = Arc::clone(&self.job_error);
        self.pool.add_job(move || {
            record_outcome(&job_error, || run_sample(&replica, &input, &output));
        });
    }
}

/// Run `job` and keep the first failure, panics included, as a job error.
fn record_outcome<F>(slot: &Mutex<Option<NetworkError>>, job: F)
where
    F: FnOnce() -> Result<()>,
{
    let message = match panic::catch_unwind(AssertUnwindSafe(job)) {
        Ok(Ok(())) => return,
        Ok(Err(err)) => err.to_string(),
        Err(payload) => format!("replica panicked: {}", panic_message(payload.as_ref())),
    };
    slot.lock().get_or_insert(NetworkError::Job(message));
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

/// Forward and backward pass of one sample on one replica.
fn run_sample(replica: &Replica, input: &[f32], output: &[f32]) -> Result<()> {
    let mut network = replica.lock();
    network.set_input(input)?;
    network.set_output(output)?;
    network.feed_forward()?;
    network.back_propagate()
}

impl NetworkInterface for NetworkParallel {
    fn set_training(&mut self, training: bool) {
        self.wait_all();
        for replica in &self.replicas {
            replica.lock().set_training(training);
        }
        self.training = training;
    }

    fn is_training(&self) -> bool {
        self.training
    }

    fn set_input(&mut self, data: &[f32]) -> Result<()> {
        if !self.training {
            return self.primary().lock().set_input(data);
        }
        if data.len() > self.input_capacity {
            return Err(NetworkError::SampleSize);
        }
        self.staged_input = data.to_vec();
        Ok(())
    }

    fn set_output(&mut self, data: &[f32]) -> Result<()> {
        if !self.training {
            return self.primary().lock().set_output(data);
        }
        if data.len() > self.output_capacity {
            return Err(NetworkError::OutputSize);
        }
        self.staged_output = data.to_vec();
        Ok(())
    }

    fn output(&self) -> Vec<f32> {
        self.primary().lock().output()
    }

    fn feed_forward(&mut self) -> Result<()> {
        if self.training {
            self.dispatch();
            Ok(())
        } else {
            self.primary().lock().feed_forward()
        }
    }

    /// Backward passes run inside the training jobs; only inference mode
    /// propagates here.
    fn back_propagate(&mut self) -> Result<()> {
        if self.training {
            Ok(())
        } else {
            self.primary().lock().back_propagate()
        }
    }

    fn clear_gradients(&mut self) -> Result<()> {
        self.wait_all();
        self.take_job_error()?;
        for replica in &self.replicas {
            replica.lock().clear_gradients()?;
        }
        self.session.tank().clear_cumulative(self.group);
        self.cursor = 0;
        Ok(())
    }

    fn gradient_descent(&mut self) -> Result<()> {
        self.wait_all();
        self.take_job_error()?;
        self.session.tank().accumulate(self.group)?;
        let samples: usize = self
            .replicas
            .iter()
            .map(|r| r.lock().training_samples())
            .sum();
        debug!("applying gradients accumulated over {} samples", samples);
        {
            let mut primary = self.primary().lock();
            primary.set_training_samples(samples);
            primary.gradient_descent()?;
        }
        self.session.tank().clear_cumulative(self.group);
        for replica in &self.replicas {
            replica.lock().set_training_samples(0);
        }
        self.cursor = 0;
        Ok(())
    }

    fn gradient_check(&mut self, reference_output: &[f32]) -> Result<GradientCheckReport> {
        self.wait_all();
        self.primary().lock().gradient_check(reference_output)
    }

    fn count_layers(&self) -> usize {
        self.primary().lock().count_layers()
    }

    fn layer_params(&self, index: usize) -> Result<LayerParams> {
        self.wait_all();
        self.primary().lock().layer_params(index)
    }

    /// Parameters are shared, so writing them through replica 0 updates all.
    fn set_layer_params(&mut self, index: usize, params: &LayerParams) -> Result<()> {
        self.wait_all();
        self.primary().lock().set_layer_params(index, params)
    }

    fn mean_loss(&self) -> f32 {
        self.wait_all();
        let (sum, count) = self
            .replicas
            .iter()
            .map(|r| r.lock().loss_stats())
            .fold((0.0, 0), |(s, c), (rs, rc)| (s + rs, c + rc));
        if count == 0 {
            0.0
        } else {
            (sum / count as f64) as f32
        }
    }

    fn reset_loss(&mut self) {
        self.wait_all();
        for replica in &self.replicas {
            replica.lock().reset_loss();
        }
    }

    fn dump_weights(&self) -> String {
        self.primary().lock().dump_weights()
    }

    fn dump_bias(&self) -> String {
        self.primary().lock().dump_bias()
    }

    fn dump_activations(&self) -> String {
        self.primary().lock().dump_activations()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_outcome_keeps_first_error() {
        let slot = Mutex::new(None);
        record_outcome(&slot, || Ok(()));
        assert!(slot.lock().is_none());

        record_outcome(&slot, || Err(NetworkError::SampleSize));
        record_outcome(&slot, || Err(NetworkError::OutputSize));
        let message = slot.lock().take().map(|e| e.to_string()).unwrap();
        assert!(message.contains("sample size exceeds"));
    }

    #[test]
    fn test_record_outcome_catches_panics() {
        let slot = Mutex::new(None);
        record_outcome(&slot, || panic!("replica exploded"));
        match slot.lock().take() {
            Some(NetworkError::Job(message)) => {
                assert!(message.contains("replica panicked"));
                assert!(message.contains("replica exploded"));
            }
            other => panic!("expected a job error, got {:?}", other),
        }

        record_outcome(&slot, || panic!("{}", String::from("formatted")));
        let message = slot.lock().take().map(|e| e.to_string()).unwrap();
        assert!(message.contains("formatted"));
    }
}
