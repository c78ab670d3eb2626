//! Error type shared by tensors, layers, solvers and trainers.

use thiserror::Error;

/// Errors raised by the training engine.
///
/// Every variant is a programming or configuration error: nothing inside the
/// crate retries, the error is surfaced to the caller as soon as it is detected.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// Operands of a tensor operation do not have compatible shapes.
    #[error("inconsistent tensor size for {0}")]
    InconsistentSize(&'static str),

    #[error("invalid fill size!")]
    InvalidFillSize,

    #[error("invalid tensor subsampling")]
    InvalidSubsampling,

    #[error("operation not supported for replicated tensors")]
    ReplicatedTensor,

    #[error("unsupported convolution stride {0}")]
    UnsupportedStride(usize),

    /// A layer cannot be populated from its topology record.
    #[error("{0}")]
    LayerConfiguration(String),

    #[error("cannot set solver size to zero")]
    ZeroSolverSize,

    #[error("no solver registered!")]
    NoSolverRegistered,

    #[error("invalid layer index")]
    InvalidLayerIndex,

    #[error("inconsistent layer size")]
    InconsistentLayerSize,

    #[error("sample size exceeds allocated layer size!")]
    SampleSize,

    #[error("output size exceeds allocated layer size!")]
    OutputSize,

    #[error("maximum number of parallel replicas is {max}, requested {requested}")]
    ReplicaLimit { requested: usize, max: usize },

    #[error("parallel job failed: {0}")]
    Job(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, NetworkError>;
