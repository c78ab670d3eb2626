//! Convolutional neural network training engine.
//!
//! This library builds sequential networks from a topology of input,
//! convolutional, max pooling, dropout, fully connected and output layers,
//! and trains them by mini-batch gradient descent, either on a single
//! network or on replicas sharing their parameters across a worker pool.
//!
//! # Modules
//!
//! - `tensor`: 4-D tensors, tensor operations and the shared tensor registry
//! - `layers`: Layer trait and implementations
//! - `solvers`: SGD, RMSProp, Adadelta, Adagrad and Adamax update rules
//! - `network`: Sequential network and gradient check
//! - `network_parallel`: Data-parallel training over shared replicas
//! - `session`: Solver and tensor registry of one training run
//! - `trainer`: Batch and iterative training loops
//! - `gradient_checker`: Numeric gradient bookkeeping
//! - `utils`: Activations, losses, learning rate scheduling, RNG, thread pool
//! - `config`: Training configuration structures
//! - `architecture`: Architecture configuration and network building
//!
//! # Example
//!
//! ```
//! use rust_convnet::layers::LayerDescr;
//! use rust_convnet::network::{Network, NetworkInterface};
//! use rust_convnet::solvers::{shared_solver, Sgd};
//! use rust_convnet::utils::rng::NetworkRng;
//!
//! let topology = vec![
//!     LayerDescr::input(4, 1, 1),
//!     LayerDescr::full(3, 1, 1),
//!     LayerDescr::output(2, 1, 1),
//! ];
//! let solver = shared_solver(Sgd::default());
//! let mut rng = NetworkRng::new(7);
//! let mut network = Network::new(&topology, solver, &mut rng).unwrap();
//! network.set_input(&[0.1, 0.2, 0.3, 0.4]).unwrap();
//! network.feed_forward().unwrap();
//! assert_eq!(network.output().len(), 2);
//! ```

pub mod architecture;
pub mod config;
pub mod error;
pub mod gradient_checker;
pub mod layers;
pub mod network;
pub mod network_parallel;
pub mod session;
pub mod solvers;
pub mod tensor;
pub mod trainer;
pub mod utils;

pub use error::{NetworkError, Result};
pub use network::{Network, NetworkInterface};
pub use network_parallel::NetworkParallel;
pub use session::TrainingSession;
pub use tensor::Tensor;
