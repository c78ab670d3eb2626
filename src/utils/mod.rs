//! Shared utilities: activation and loss functions, learning rate
//! scheduling, seeded randomness and the worker pool used for parallel
//! training.

pub mod activations;
pub mod loss;
pub mod lr_scheduler;
pub mod rng;
pub mod thread_pool;
