//! Tests for the training loops
//!
//! Small problems are trained end to end with both the batch and the
//! iterative trainer, on a single network and on the parallel trainer.

use rust_convnet::layers::LayerDescr;
use rust_convnet::network::{Network, NetworkInterface};
use rust_convnet::network_parallel::NetworkParallel;
use rust_convnet::session::TrainingSession;
use rust_convnet::solvers::{shared_solver, Sgd};
use rust_convnet::trainer::{batch_train, compute_output, IterativeTrainer, Sample};
use rust_convnet::utils::activations::Activation;
use rust_convnet::utils::loss::Loss;
use rust_convnet::utils::lr_scheduler::LearningScheduler;
use rust_convnet::utils::rng::NetworkRng;
use std::sync::Arc;

fn xor_samples() -> Vec<Sample> {
    [
        ([0.0, 0.0], 0.0),
        ([0.0, 1.0], 1.0),
        ([1.0, 0.0], 1.0),
        ([1.0, 1.0], 0.0),
    ]
    .iter()
    .map(|(x, y)| Sample::new(x.to_vec(), vec![*y]))
    .collect()
}

fn xor_topology() -> Vec<LayerDescr> {
    vec![
        LayerDescr::input(2, 1, 1),
        LayerDescr::full(4, 1, 1).with_activation(Activation::Tanh),
        LayerDescr::output(1, 1, 1)
            .with_activation(Activation::Sigmoid)
            .with_loss(Loss::MeanSquared),
    ]
}

fn xor_network(seed: u64) -> Network {
    let mut rng = NetworkRng::new(seed);
    Network::new(
        &xor_topology(),
        shared_solver(Sgd::new(0.5, 0.0, 0.9)),
        &mut rng,
    )
    .unwrap()
}

// ============================================================================
// Batch Training Tests
// ============================================================================

mod batch_tests {
    use super::*;

    #[test]
    fn test_batch_training_reduces_loss() {
        let mut network = xor_network(42);
        let mut rng = NetworkRng::new(1);
        let losses = batch_train(&mut network, &xor_samples(), 300, 4, &mut rng, None).unwrap();
        assert_eq!(losses.len(), 300);
        assert!(
            losses[losses.len() - 1] < losses[0],
            "first {} last {}",
            losses[0],
            losses[losses.len() - 1]
        );
        assert!(!network.is_training());
    }

    #[test]
    fn test_parallel_batch_training_reduces_loss() {
        let session = Arc::new(TrainingSession::new(shared_solver(Sgd::new(0.5, 0.0, 0.9))));
        let mut rng = NetworkRng::new(42);
        let mut network = NetworkParallel::new(&xor_topology(), 2, session, &mut rng).unwrap();
        let losses = batch_train(&mut network, &xor_samples(), 300, 4, &mut rng, None).unwrap();
        assert!(losses[losses.len() - 1] < losses[0]);
    }

    #[test]
    fn test_scheduler_receives_epoch_losses() {
        let mut network = xor_network(3);
        let mut scheduler = LearningScheduler::with_window(1);
        scheduler.register_solver(network.solver());
        scheduler.enable_scheduling(true).unwrap();

        // window 1 compares each loss with itself, so every epoch halves the rate
        let mut rng = NetworkRng::new(2);
        batch_train(
            &mut network,
            &xor_samples(),
            3,
            2,
            &mut rng,
            Some(&mut scheduler),
        )
        .unwrap();
        assert!((scheduler.learning_rate().unwrap() - 0.5 / 8.0).abs() < 1e-7);
    }

    #[test]
    fn test_zero_batch_size() {
        let mut network = xor_network(3);
        let mut rng = NetworkRng::new(2);
        assert!(batch_train(&mut network, &xor_samples(), 1, 0, &mut rng, None).is_err());
    }

    #[test]
    fn test_compute_output_restores_mode() {
        let mut network = xor_network(3);
        network.set_training(true);
        let output = compute_output(&mut network, &[1.0, 0.0]).unwrap();
        assert_eq!(output.len(), 1);
        assert!(output[0] > 0.0 && output[0] < 1.0);
        assert!(network.is_training());
    }
}

// ============================================================================
// Iterative Training Tests
// ============================================================================

mod iterative_tests {
    use super::*;

    #[test]
    fn test_descends_every_batch() {
        let mut network = xor_network(5);
        let mut trainer = IterativeTrainer::new(3).unwrap();
        let samples = xor_samples();
        let before = network.layer_params(2).unwrap();

        assert!(!trainer.train_new(&mut network, &samples[0]).unwrap());
        assert!(!trainer.train_new(&mut network, &samples[1]).unwrap());
        assert_eq!(trainer.pending(), 2);
        assert_eq!(network.layer_params(2).unwrap(), before);

        assert!(trainer.train_new(&mut network, &samples[2]).unwrap());
        assert_eq!(trainer.pending(), 0);
        assert_ne!(network.layer_params(2).unwrap(), before);
    }

    #[test]
    fn test_flush_applies_partial_batch() {
        let mut network = xor_network(5);
        let mut trainer = IterativeTrainer::new(10).unwrap();
        let before = network.layer_params(1).unwrap();
        trainer.train_new(&mut network, &xor_samples()[1]).unwrap();
        trainer.flush(&mut network).unwrap();
        assert_eq!(trainer.pending(), 0);
        assert_ne!(network.layer_params(1).unwrap(), before);

        // nothing pending, nothing to do
        trainer.flush(&mut network).unwrap();
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        assert!(IterativeTrainer::new(0).is_err());
    }
}
