//! Plateau-driven learning rate scheduler.
//!
//! The scheduler holds a weak registration to one solver. Errors are pushed
//! once per epoch (or any other period); every `window` pushes the newest
//! error is compared against the one recorded at the start of the window and
//! the solver's learning rate is halved when it has not improved.
//!
//! # Example
//!
//! ```
//! use rust_convnet::solvers::{shared_solver, Sgd};
//! use rust_convnet::utils::lr_scheduler::LearningScheduler;
//!
//! let solver = shared_solver(Sgd::new(0.1, 0.0, 0.9));
//! let mut scheduler = LearningScheduler::new();
//! scheduler.register_solver(&solver);
//! scheduler.enable_scheduling(true).unwrap();
//!
//! for _ in 0..5 {
//!     scheduler.push_error(1.0).unwrap();
//! }
//! assert!((scheduler.learning_rate().unwrap() - 0.05).abs() < 1e-7);
//! ```

use crate::error::{NetworkError, Result};
use crate::solvers::{SharedSolver, Solver};
use log::{info, warn};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// Number of pushes between two comparisons.
pub const DEFAULT_WINDOW: usize = 5;

#[derive(Debug)]
pub struct LearningScheduler {
    solver: Option<Weak<Mutex<dyn Solver>>>,
    enabled: bool,
    cached_rate: f32,
    cached_error: f32,
    err_count: usize,
    window: usize,
}

impl Default for LearningScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl LearningScheduler {
    pub fn new() -> Self {
        Self::with_window(DEFAULT_WINDOW)
    }

    pub fn with_window(window: usize) -> Self {
        Self {
            solver: None,
            enabled: false,
            cached_rate: 0.0,
            cached_error: 0.0,
            err_count: 0,
            window: window.max(1),
        }
    }

    pub fn register_solver(&mut self, solver: &SharedSolver) {
        self.solver = Some(Arc::downgrade(solver));
    }

    fn solver(&self) -> Result<SharedSolver> {
        self.solver
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or(NetworkError::NoSolverRegistered)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Turn scheduling on or off.
    ///
    /// Enabling caches the current learning rate, disabling restores it.
    pub fn enable_scheduling(&mut self, enable: bool) -> Result<()> {
        let solver = self.solver()?;
        if enable == self.enabled {
            warn!(
                "learning rate scheduling already {}",
                if enable { "enabled" } else { "disabled" }
            );
            return Ok(());
        }
        let mut solver = solver.lock();
        if enable {
            self.cached_rate = solver.learning_rate();
            self.err_count = 0;
        } else {
            solver.set_learning_rate(self.cached_rate);
        }
        self.enabled = enable;
        Ok(())
    }

    /// Record a new error value. Ignored while scheduling is disabled.
    pub fn push_error(&mut self, error: f32) -> Result<()> {
        let solver = self.solver()?;
        if !self.enabled {
            return Ok(());
        }
        if self.err_count == 0 {
            self.cached_error = error;
        }
        self.err_count += 1;
        if self.err_count >= self.window {
            if error >= self.cached_error {
                let mut solver = solver.lock();
                let halved = solver.learning_rate() / 2.0;
                solver.set_learning_rate(halved);
                info!(
                    "error stagnating ({} >= {}), learning rate set to {}",
                    error, self.cached_error, halved
                );
            }
            self.err_count = 0;
        }
        Ok(())
    }

    pub fn learning_rate(&self) -> Result<f32> {
        Ok(self.solver()?.lock().learning_rate())
    }

    pub fn set_learning_rate(&self, lr: f32) -> Result<()> {
        self.solver()?.lock().set_learning_rate(lr);
        Ok(())
    }
}
