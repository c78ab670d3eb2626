//! Tests for the multi-replica trainer
//!
//! The parallel trainer must produce the same parameters as a single
//! network trained on the same mini-batch, whatever the replica count.

use approx::assert_relative_eq;
use rust_convnet::layers::LayerDescr;
use rust_convnet::network::{LayerParams, Network, NetworkInterface};
use rust_convnet::network_parallel::{NetworkParallel, MAX_PARALLEL_REPLICAS};
use rust_convnet::session::TrainingSession;
use rust_convnet::solvers::{shared_solver, Sgd};
use rust_convnet::utils::activations::Activation;
use rust_convnet::utils::rng::NetworkRng;
use rust_convnet::NetworkError;
use std::sync::Arc;

fn topology() -> Vec<LayerDescr> {
    vec![
        LayerDescr::input(4, 4, 1),
        LayerDescr::conv(3, 3, 2, 2).with_activation(Activation::Tanh),
        LayerDescr::full(4, 1, 1).with_activation(Activation::Sigmoid),
        LayerDescr::output(2, 1, 1).with_activation(Activation::Sigmoid),
    ]
}

fn samples() -> Vec<(Vec<f32>, Vec<f32>)> {
    (0..6)
        .map(|s| {
            let input = (0..16).map(|i| ((i + 3 * s) % 5) as f32 / 5.0).collect();
            let output = if s % 2 == 0 { vec![1.0, 0.0] } else { vec![0.0, 1.0] };
            (input, output)
        })
        .collect()
}

fn parallel(replicas: usize, seed: u64) -> rust_convnet::Result<NetworkParallel> {
    let session = Arc::new(TrainingSession::new(shared_solver(Sgd::new(0.2, 0.0, 0.9))));
    let mut rng = NetworkRng::new(seed);
    NetworkParallel::new(&topology(), replicas, session, &mut rng)
}

fn train_once<N: NetworkInterface>(network: &mut N) {
    network.set_training(true);
    network.clear_gradients().unwrap();
    for (input, output) in samples() {
        network.set_input(&input).unwrap();
        network.set_output(&output).unwrap();
        network.feed_forward().unwrap();
        network.back_propagate().unwrap();
    }
    network.gradient_descent().unwrap();
}

fn assert_params_close(a: &LayerParams, b: &LayerParams) {
    assert_eq!(a.weights.len(), b.weights.len());
    assert_eq!(a.bias.len(), b.bias.len());
    for (x, y) in a.weights.iter().zip(&b.weights).chain(a.bias.iter().zip(&b.bias)) {
        assert_relative_eq!(*x, *y, epsilon = 1e-5);
    }
}

// ============================================================================
// Equivalence Tests
// ============================================================================

mod equivalence_tests {
    use super::*;

    fn check_equivalence(replicas: usize) {
        let mut par = parallel(replicas, 31).unwrap();
        let mut rng = NetworkRng::new(99);
        let mut single = Network::new(
            &topology(),
            shared_solver(Sgd::new(0.2, 0.0, 0.9)),
            &mut rng,
        )
        .unwrap();
        for index in 0..single.count_layers() {
            single
                .set_layer_params(index, &par.layer_params(index).unwrap())
                .unwrap();
        }

        for _ in 0..2 {
            train_once(&mut par);
            train_once(&mut single);
        }

        for index in 0..single.count_layers() {
            assert_params_close(
                &par.layer_params(index).unwrap(),
                &single.layer_params(index).unwrap(),
            );
        }
    }

    #[test]
    fn test_one_replica_matches_single_network() {
        check_equivalence(1);
    }

    #[test]
    fn test_three_replicas_match_single_network() {
        check_equivalence(3);
    }

    #[test]
    fn test_more_replicas_than_samples() {
        check_equivalence(MAX_PARALLEL_REPLICAS);
    }

    #[test]
    fn test_mean_loss_covers_all_replicas() {
        let mut par = parallel(3, 7).unwrap();
        par.reset_loss();
        train_once(&mut par);
        let loss = par.mean_loss();
        assert!(loss > 0.0);

        par.reset_loss();
        assert_eq!(par.mean_loss(), 0.0);
    }
}

// ============================================================================
// Sharing Tests
// ============================================================================

mod sharing_tests {
    use super::*;

    #[test]
    fn test_replicas_share_parameters() {
        let mut par = parallel(4, 2).unwrap();
        assert_eq!(par.replica_count(), 4);

        let params = LayerParams {
            weights: vec![0.25; 4 * 18],
            bias: vec![-0.5; 4],
        };
        par.set_layer_params(2, &params).unwrap();
        assert_eq!(par.layer_params(2).unwrap(), params);

        // one value tensor plus one cache per parameter, whatever the replica count
        let trainable = 3 * 2;
        assert_eq!(par.session().tank().shared_count(), trainable * 2);
    }

    fn single_copy_of<N: NetworkInterface>(source: &N) -> Network {
        let mut rng = NetworkRng::new(99);
        let mut single = Network::new(
            &topology(),
            shared_solver(Sgd::new(0.2, 0.0, 0.0)),
            &mut rng,
        )
        .unwrap();
        for index in 0..single.count_layers() {
            single
                .set_layer_params(index, &source.layer_params(index).unwrap())
                .unwrap();
        }
        single
    }

    fn plain_sgd_session() -> Arc<TrainingSession> {
        Arc::new(TrainingSession::new(shared_solver(Sgd::new(0.2, 0.0, 0.0))))
    }

    fn assert_trains_like_single(par: &mut NetworkParallel) {
        let before = par.layer_params(1).unwrap();
        let mut single = single_copy_of(par);
        train_once(par);
        train_once(&mut single);

        let after = par.layer_params(1).unwrap();
        let movement: f32 = before
            .weights
            .iter()
            .zip(&after.weights)
            .map(|(a, b)| (a - b).abs())
            .sum();
        assert!(movement > 1e-4, "weights did not move: {}", movement);
        for index in 0..single.count_layers() {
            assert_params_close(
                &par.layer_params(index).unwrap(),
                &single.layer_params(index).unwrap(),
            );
        }
    }

    #[test]
    fn test_earlier_session_replica_keeps_its_own_deltas() {
        let session = plain_sgd_session();
        let mut rng = NetworkRng::new(5);
        let earlier = session.replica(&topology(), &mut rng).unwrap();
        let mut par = NetworkParallel::new(&topology(), 2, Arc::clone(&session), &mut rng).unwrap();

        assert_trains_like_single(&mut par);

        // values are still shared with the standalone replica
        assert_eq!(earlier.layer_params(1).unwrap(), par.layer_params(1).unwrap());
    }

    #[test]
    fn test_two_trainers_on_one_session() {
        let session = plain_sgd_session();
        let mut rng = NetworkRng::new(6);
        let mut first = NetworkParallel::new(&topology(), 2, Arc::clone(&session), &mut rng).unwrap();
        let mut second =
            NetworkParallel::new(&topology(), 3, Arc::clone(&session), &mut rng).unwrap();

        assert_trains_like_single(&mut second);
        assert_trains_like_single(&mut first);
    }

    #[test]
    fn test_inference_runs_on_first_replica() {
        let mut par = parallel(2, 4).unwrap();
        par.set_training(false);
        let data = samples();
        par.set_input(&data[0].0).unwrap();
        par.feed_forward().unwrap();
        let first = par.output();
        assert_eq!(first.len(), 2);

        par.feed_forward().unwrap();
        assert_eq!(par.output(), first);
    }
}

// ============================================================================
// Error Handling Tests
// ============================================================================

mod error_tests {
    use super::*;

    #[test]
    fn test_replica_limit() {
        match parallel(MAX_PARALLEL_REPLICAS + 1, 1) {
            Err(NetworkError::ReplicaLimit { requested, max }) => {
                assert_eq!(requested, MAX_PARALLEL_REPLICAS + 1);
                assert_eq!(max, MAX_PARALLEL_REPLICAS);
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("replica count above the limit accepted"),
        }
    }

    #[test]
    fn test_zero_replicas() {
        assert!(parallel(0, 1).is_err());
    }

    #[test]
    fn test_staged_sample_sizes_checked() {
        let mut par = parallel(2, 1).unwrap();
        par.set_training(true);
        assert!(matches!(
            par.set_input(&[0.0; 17]),
            Err(NetworkError::SampleSize)
        ));
        assert!(matches!(
            par.set_output(&[0.0; 3]),
            Err(NetworkError::OutputSize)
        ));
    }
}
