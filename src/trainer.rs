//! Training loops over labelled samples.
//!
//! Both loops drive any [`NetworkInterface`], so the same code trains a
//! single network or a parallel trainer.

use crate::error::{NetworkError, Result};
use crate::network::NetworkInterface;
use crate::utils::lr_scheduler::LearningScheduler;
use crate::utils::rng::NetworkRng;
use log::info;

/// One input buffer and its expected output.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub input: Vec<f32>,
    pub output: Vec<f32>,
}

impl Sample {
    pub fn new(input: Vec<f32>, output: Vec<f32>) -> Self {
        Self { input, output }
    }
}

/// Run one mini-batch: clear, accumulate every sample, descend once.
pub fn train_batch<N>(network: &mut N, batch: &[&Sample]) -> Result<()>
where
    N: NetworkInterface + ?Sized,
{
    network.clear_gradients()?;
    for sample in batch {
        network.set_input(&sample.input)?;
        network.set_output(&sample.output)?;
        network.feed_forward()?;
        network.back_propagate()?;
    }
    network.gradient_descent()
}

/// Train for `epochs` passes over `samples` in shuffled mini-batches.
///
/// Returns the mean loss of each epoch. When a scheduler is given, each
/// epoch's loss is pushed to it.
pub fn batch_train<N>(
    network: &mut N,
    samples: &[Sample],
    epochs: usize,
    batch_size: usize,
    rng: &mut NetworkRng,
    mut scheduler: Option<&mut LearningScheduler>,
) -> Result<Vec<f32>>
where
    N: NetworkInterface + ?Sized,
{
    if batch_size == 0 {
        return Err(NetworkError::InvalidConfig(
            "batch size must be positive".to_string(),
        ));
    }
    let was_training = network.is_training();
    network.set_training(true);

    let mut order: Vec<usize> = (0..samples.len()).collect();
    let mut losses = Vec::with_capacity(epochs);
    for epoch in 0..epochs {
        rng.shuffle_usize(&mut order);
        network.reset_loss();
        for chunk in order.chunks(batch_size) {
            let batch: Vec<&Sample> = chunk.iter().map(|&i| &samples[i]).collect();
            train_batch(network, &batch)?;
        }
        let loss = network.mean_loss();
        info!("epoch {}: mean loss {}", epoch + 1, loss);
        if let Some(scheduler) = scheduler.as_deref_mut() {
            scheduler.push_error(loss)?;
        }
        losses.push(loss);
    }

    network.set_training(was_training);
    Ok(losses)
}

/// Run one sample in inference mode and return the output.
pub fn compute_output<N>(network: &mut N, input: &[f32]) -> Result<Vec<f32>>
where
    N: NetworkInterface + ?Sized,
{
    let was_training = network.is_training();
    network.set_training(false);
    let result = forward_sample(network, input);
    network.set_training(was_training);
    result
}

fn forward_sample<N>(network: &mut N, input: &[f32]) -> Result<Vec<f32>>
where
    N: NetworkInterface + ?Sized,
{
    network.set_input(input)?;
    network.feed_forward()?;
    Ok(network.output())
}

/// Online trainer: accumulates samples one by one and descends every
/// `batch_size` samples.
#[derive(Debug)]
pub struct IterativeTrainer {
    batch_size: usize,
    pending: usize,
}

impl IterativeTrainer {
    pub fn new(batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(NetworkError::InvalidConfig(
                "batch size must be positive".to_string(),
            ));
        }
        Ok(Self {
            batch_size,
            pending: 0,
        })
    }

    /// Samples accumulated since the last gradient step.
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Accumulate one sample; returns true when a gradient step was taken.
    pub fn train_new<N>(&mut self, network: &mut N, sample: &Sample) -> Result<bool>
    where
        N: NetworkInterface + ?Sized,
    {
        if !network.is_training() {
            network.set_training(true);
        }
        if self.pending == 0 {
            network.clear_gradients()?;
        }
        network.set_input(&sample.input)?;
        network.set_output(&sample.output)?;
        network.feed_forward()?;
        network.back_propagate()?;
        self.pending += 1;
        if self.pending >= self.batch_size {
            self.flush(network)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Apply the gradients of any pending samples.
    pub fn flush<N>(&mut self, network: &mut N) -> Result<()>
    where
        N: NetworkInterface + ?Sized,
    {
        if self.pending > 0 {
            network.gradient_descent()?;
            self.pending = 0;
        }
        Ok(())
    }
}
