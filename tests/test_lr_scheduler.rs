//! Tests for the plateau learning rate scheduler
//!
//! This file covers:
//! - Registration and the missing-solver error
//! - Enabling and disabling (rate caching and restoring)
//! - Halving on a stagnating window, keeping the rate on improvement

use approx::assert_relative_eq;
use rust_convnet::solvers::{shared_solver, Sgd, SharedSolver, Solver};
use rust_convnet::utils::lr_scheduler::{LearningScheduler, DEFAULT_WINDOW};
use rust_convnet::NetworkError;

fn solver(lr: f32) -> SharedSolver {
    shared_solver(Sgd::new(lr, 0.0, 0.9))
}

fn scheduler_for(solver: &SharedSolver) -> LearningScheduler {
    let mut scheduler = LearningScheduler::new();
    scheduler.register_solver(solver);
    scheduler.enable_scheduling(true).unwrap();
    scheduler
}

// ============================================================================
// Registration Tests
// ============================================================================

mod registration_tests {
    use super::*;

    #[test]
    fn test_unregistered_scheduler_fails() {
        let mut scheduler = LearningScheduler::new();
        assert!(matches!(
            scheduler.enable_scheduling(true),
            Err(NetworkError::NoSolverRegistered)
        ));
        assert!(matches!(
            scheduler.push_error(1.0),
            Err(NetworkError::NoSolverRegistered)
        ));
        assert!(scheduler.learning_rate().is_err());
    }

    #[test]
    fn test_dropped_solver_is_unregistered() {
        let mut scheduler = LearningScheduler::new();
        {
            let solver = solver(0.1);
            scheduler.register_solver(&solver);
            assert!(scheduler.learning_rate().is_ok());
        }
        assert!(matches!(
            scheduler.learning_rate(),
            Err(NetworkError::NoSolverRegistered)
        ));
    }

    #[test]
    fn test_rate_accessors_reach_solver() {
        let solver = solver(0.1);
        let mut scheduler = LearningScheduler::new();
        scheduler.register_solver(&solver);
        scheduler.set_learning_rate(0.02).unwrap();
        assert_relative_eq!(solver.lock().learning_rate(), 0.02);
        assert_relative_eq!(scheduler.learning_rate().unwrap(), 0.02);
    }
}

// ============================================================================
// Scheduling Tests
// ============================================================================

mod scheduling_tests {
    use super::*;

    #[test]
    fn test_stagnation_halves_rate() {
        let solver = solver(0.1);
        let mut scheduler = scheduler_for(&solver);
        for _ in 0..DEFAULT_WINDOW {
            scheduler.push_error(0.5).unwrap();
        }
        assert_relative_eq!(scheduler.learning_rate().unwrap(), 0.05);

        for _ in 0..DEFAULT_WINDOW {
            scheduler.push_error(0.6).unwrap();
        }
        assert_relative_eq!(scheduler.learning_rate().unwrap(), 0.025);
    }

    #[test]
    fn test_improvement_keeps_rate() {
        let solver = solver(0.1);
        let mut scheduler = scheduler_for(&solver);
        for step in 0..DEFAULT_WINDOW {
            scheduler.push_error(1.0 - step as f32 * 0.1).unwrap();
        }
        assert_relative_eq!(scheduler.learning_rate().unwrap(), 0.1);
    }

    #[test]
    fn test_no_change_inside_window() {
        let solver = solver(0.1);
        let mut scheduler = scheduler_for(&solver);
        for _ in 0..DEFAULT_WINDOW - 1 {
            scheduler.push_error(2.0).unwrap();
        }
        assert_relative_eq!(scheduler.learning_rate().unwrap(), 0.1);
    }

    #[test]
    fn test_disabled_scheduler_ignores_errors() {
        let solver = solver(0.1);
        let mut scheduler = LearningScheduler::new();
        scheduler.register_solver(&solver);
        for _ in 0..3 * DEFAULT_WINDOW {
            scheduler.push_error(1.0).unwrap();
        }
        assert!(!scheduler.is_enabled());
        assert_relative_eq!(scheduler.learning_rate().unwrap(), 0.1);
    }

    #[test]
    fn test_disable_restores_cached_rate() {
        let solver = solver(0.1);
        let mut scheduler = scheduler_for(&solver);
        for _ in 0..2 * DEFAULT_WINDOW {
            scheduler.push_error(1.0).unwrap();
        }
        assert_relative_eq!(scheduler.learning_rate().unwrap(), 0.025);

        scheduler.enable_scheduling(false).unwrap();
        assert_relative_eq!(scheduler.learning_rate().unwrap(), 0.1);
    }

    #[test]
    fn test_redundant_enable_is_harmless() {
        let solver = solver(0.1);
        let mut scheduler = scheduler_for(&solver);
        scheduler.enable_scheduling(true).unwrap();
        assert!(scheduler.is_enabled());
    }

    #[test]
    fn test_custom_window() {
        let solver = solver(0.4);
        let mut scheduler = LearningScheduler::with_window(2);
        scheduler.register_solver(&solver);
        scheduler.enable_scheduling(true).unwrap();
        scheduler.push_error(1.0).unwrap();
        scheduler.push_error(1.0).unwrap();
        assert_relative_eq!(scheduler.learning_rate().unwrap(), 0.2);
    }
}
