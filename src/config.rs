//! Training configuration loaded from JSON.
//!
//! ```json
//! {
//!   "solver": { "solver_type": "SGD", "learning_rate": 0.01, "momentum": 0.9 },
//!   "batch_size": 10,
//!   "epochs": 20,
//!   "parallel_replicas": 4,
//!   "learning_scheduling": true,
//!   "seed": 42
//! }
//! ```

use crate::error::{NetworkError, Result};
use crate::network_parallel::MAX_PARALLEL_REPLICAS;
use crate::solvers::{
    shared_solver, Adadelta, Adagrad, Adamax, RmsProp, Sgd, SharedSolver, Solver, SolverKind,
};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Solver selection and hyperparameters. Missing values take the solver's
/// defaults.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SolverConfig {
    /// "SGD", "RMS_PROP", "ADADELTA", "ADAGRAD" or "ADAMAX"
    pub solver_type: String,

    pub learning_rate: Option<f32>,

    /// L2 weight decay (SGD only)
    pub weight_decay: Option<f32>,

    /// Momentum for SGD, first moment decay for Adamax, decay rate of the
    /// running averages otherwise
    pub momentum: Option<f32>,

    pub epsilon: Option<f32>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            solver_type: "SGD".to_string(),
            learning_rate: None,
            weight_decay: None,
            momentum: None,
            epsilon: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TrainingConfig {
    #[serde(default)]
    pub solver: SolverConfig,

    pub batch_size: usize,

    pub epochs: usize,

    /// Number of replicas for parallel training; sequential when absent
    pub parallel_replicas: Option<usize>,

    /// Halve the learning rate when the epoch loss stagnates
    #[serde(default)]
    pub learning_scheduling: bool,

    pub seed: Option<u64>,
}

/// Loads a training configuration from a JSON file.
///
/// # Examples
///
/// ```no_run
/// use rust_convnet::config::load_config;
///
/// let cfg = load_config("config/lenet_training.json").unwrap();
/// assert!(cfg.batch_size > 0);
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<TrainingConfig> {
    let contents = fs::read_to_string(path)?;
    parse_config(&contents)
}

pub fn parse_config(json: &str) -> Result<TrainingConfig> {
    let config: TrainingConfig = serde_json::from_str(json)?;
    validate_config(&config)?;
    Ok(config)
}

pub fn validate_config(config: &TrainingConfig) -> Result<()> {
    let invalid = |msg: String| Err(NetworkError::InvalidConfig(msg));
    if config.batch_size == 0 {
        return invalid("batch_size must be positive".to_string());
    }
    if config.epochs == 0 {
        return invalid("epochs must be positive".to_string());
    }
    if let Some(replicas) = config.parallel_replicas {
        if replicas == 0 || replicas > MAX_PARALLEL_REPLICAS {
            return invalid(format!(
                "parallel_replicas must be in 1..={}",
                MAX_PARALLEL_REPLICAS
            ));
        }
    }
    validate_solver(&config.solver)
}

fn validate_solver(solver: &SolverConfig) -> Result<()> {
    if SolverKind::from_name(&solver.solver_type).is_none() {
        return Err(NetworkError::InvalidConfig(format!(
            "Invalid solver type '{}'. Must be one of: SGD, RMS_PROP, ADADELTA, ADAGRAD, ADAMAX",
            solver.solver_type
        )));
    }
    let checks = [
        ("learning_rate", solver.learning_rate),
        ("weight_decay", solver.weight_decay),
        ("momentum", solver.momentum),
        ("epsilon", solver.epsilon),
    ];
    for (name, value) in checks {
        if let Some(value) = value {
            if !value.is_finite() || value < 0.0 {
                return Err(NetworkError::InvalidConfig(format!(
                    "{} must be a non-negative number",
                    name
                )));
            }
        }
    }
    if let Some(momentum) = solver.momentum {
        if momentum >= 1.0 {
            return Err(NetworkError::InvalidConfig(
                "momentum must be below 1".to_string(),
            ));
        }
    }
    Ok(())
}

/// Build the solver described by `config`.
pub fn build_solver(config: &SolverConfig) -> Result<SharedSolver> {
    validate_solver(config)?;
    let kind = SolverKind::from_name(&config.solver_type).ok_or_else(|| {
        NetworkError::InvalidConfig(format!("unknown solver {}", config.solver_type))
    })?;
    let solver = match kind {
        SolverKind::Sgd => {
            let d = Sgd::default();
            shared_solver(Sgd::new(
                config.learning_rate.unwrap_or(d.learning_rate()),
                config.weight_decay.unwrap_or(d.weight_decay()),
                config.momentum.unwrap_or(d.momentum()),
            ))
        }
        SolverKind::RmsProp => shared_solver(RmsProp::new(
            config.learning_rate.unwrap_or(0.001),
            config.momentum.unwrap_or(0.99),
            config.epsilon.unwrap_or(1e-8),
        )),
        SolverKind::Adadelta => shared_solver(Adadelta::new(
            config.learning_rate.unwrap_or(1.0),
            config.momentum.unwrap_or(0.95),
            config.epsilon.unwrap_or(1e-8),
        )),
        SolverKind::Adagrad => shared_solver(Adagrad::new(
            config.learning_rate.unwrap_or(0.01),
            config.epsilon.unwrap_or(1e-8),
        )),
        SolverKind::Adamax => {
            let d = Adamax::default();
            shared_solver(
                Adamax::new(
                    config.learning_rate.unwrap_or(d.learning_rate()),
                    config.momentum.unwrap_or(d.mu1()),
                    d.mu2(),
                )
                .with_epsilon(config.epsilon.unwrap_or(1e-8)),
            )
        }
    };
    Ok(solver)
}
