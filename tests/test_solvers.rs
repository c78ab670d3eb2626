//! Tests for the parameter update rules
//!
//! Each solver is exercised through the `Solver` trait object, the way
//! layers use it, on a quadratic bowl whose gradient is the parameter itself.

use approx::assert_relative_eq;
use rust_convnet::solvers::{
    shared_solver, Adadelta, Adagrad, Adamax, RmsProp, Sgd, SharedSolver, Solver, SolverKind,
};
use rust_convnet::tensor::Tensor;
use rust_convnet::NetworkError;

/// Run `steps` updates of `f(p) = 0.5 p²` from `p = 1` and return `p`.
fn minimize(solver: &SharedSolver, steps: usize) -> f32 {
    let cache_size = solver.lock().cache_size();
    let mut param = Tensor::filled(1, 1, 1, 1, 1.0);
    let mut caches: Vec<Tensor> = (0..cache_size).map(|_| Tensor::new(1, 1, 1, 1)).collect();
    solver.lock().set_size(1).unwrap();
    for _ in 0..steps {
        let grad = param.clone();
        let mut refs: Vec<&mut Tensor> = caches.iter_mut().collect();
        solver.lock().update(&mut param, &mut refs, &grad).unwrap();
    }
    param.data()[0]
}

// ============================================================================
// Convergence Tests
// ============================================================================

mod convergence_tests {
    use super::*;

    #[test]
    fn test_sgd_converges() {
        let solver = shared_solver(Sgd::new(0.1, 0.0, 0.5));
        assert!(minimize(&solver, 100).abs() < 1e-3);
    }

    #[test]
    fn test_rmsprop_decreases() {
        let solver = shared_solver(RmsProp::new(0.01, 0.9, 1e-8));
        let p = minimize(&solver, 50);
        assert!(p < 1.0 && p > -0.5, "p = {}", p);
    }

    #[test]
    fn test_adadelta_decreases() {
        let solver = shared_solver(Adadelta::new(1.0, 0.95, 1e-6));
        let p = minimize(&solver, 50);
        assert!(p < 1.0, "p = {}", p);
    }

    #[test]
    fn test_adamax_decreases() {
        let solver = shared_solver(Adamax::new(0.01, 0.9, 0.999));
        let p = minimize(&solver, 50);
        assert!(p < 1.0, "p = {}", p);
    }

    #[test]
    fn test_adagrad_decreases() {
        let solver = shared_solver(Adagrad::new(0.1, 1e-8));
        let p = minimize(&solver, 50);
        assert!(p < 1.0 && p > 0.0, "p = {}", p);
    }
}

// ============================================================================
// Step Value Tests
// ============================================================================

mod step_tests {
    use super::*;

    #[test]
    fn test_sgd_momentum_two_steps() {
        let mut solver = Sgd::new(0.1, 0.0, 0.9);
        solver.set_size(1).unwrap();
        let mut p = Tensor::filled(1, 1, 1, 1, 1.0);
        let mut v = Tensor::new(1, 1, 1, 1);
        let g = Tensor::filled(1, 1, 1, 1, 1.0);

        solver.update(&mut p, &mut [&mut v], &g).unwrap();
        assert_relative_eq!(p.data()[0], 0.9, epsilon = 1e-6);
        solver.update(&mut p, &mut [&mut v], &g).unwrap();
        assert_relative_eq!(v.data()[0], -0.19, epsilon = 1e-6);
        assert_relative_eq!(p.data()[0], 0.71, epsilon = 1e-6);
    }

    #[test]
    fn test_gradient_normalized_by_batch_size() {
        let mut solver = Sgd::new(1.0, 0.0, 0.0);
        solver.set_size(4).unwrap();
        assert_relative_eq!(solver.normalize(), 0.25);
        let mut p = Tensor::filled(2, 1, 1, 1, 0.0);
        let mut v = Tensor::new(2, 1, 1, 1);
        let g = Tensor::filled(2, 1, 1, 1, 2.0);
        solver.update(&mut p, &mut [&mut v], &g).unwrap();
        assert_relative_eq!(p.data()[0], -0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_weight_decay_skipped_for_bias() {
        let mut solver = Sgd::new(0.1, 0.5, 0.0);
        solver.set_size(1).unwrap();
        let g = Tensor::new(1, 1, 1, 1);

        let mut w = Tensor::filled(1, 1, 1, 1, 1.0);
        let mut v = Tensor::new(1, 1, 1, 1);
        solver.update(&mut w, &mut [&mut v], &g).unwrap();
        assert_relative_eq!(w.data()[0], 0.95, epsilon = 1e-6);

        let mut b = Tensor::filled(1, 1, 1, 1, 1.0);
        let mut v = Tensor::new(1, 1, 1, 1);
        solver.update_redux(&mut b, &mut [&mut v], &g).unwrap();
        assert_relative_eq!(b.data()[0], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_rmsprop_first_step() {
        let mut solver = RmsProp::new(0.1, 0.9, 0.0);
        solver.set_size(1).unwrap();
        let mut p = Tensor::filled(1, 1, 1, 1, 1.0);
        let mut ms = Tensor::new(1, 1, 1, 1);
        let g = Tensor::filled(1, 1, 1, 1, 1.0);
        solver.update(&mut p, &mut [&mut ms], &g).unwrap();
        assert_relative_eq!(ms.data()[0], 0.1, epsilon = 1e-6);
        assert_relative_eq!(p.data()[0], 1.0 - 0.1 / 0.1f32.sqrt(), epsilon = 1e-5);
    }
}

// ============================================================================
// Error Handling Tests
// ============================================================================

mod error_tests {
    use super::*;

    #[test]
    fn test_zero_size_rejected() {
        let solvers: Vec<Box<dyn Solver>> = vec![
            Box::new(Sgd::default()),
            Box::new(RmsProp::default()),
            Box::new(Adadelta::default()),
            Box::new(Adagrad::default()),
            Box::new(Adamax::default()),
        ];
        for mut solver in solvers {
            assert!(matches!(solver.set_size(0), Err(NetworkError::ZeroSolverSize)));
        }
    }

    #[test]
    fn test_missing_cache_rejected() {
        let solver = Adadelta::default();
        let mut p = Tensor::new(2, 1, 1, 1);
        let mut c = Tensor::new(2, 1, 1, 1);
        let g = Tensor::new(2, 1, 1, 1);
        assert!(solver.update(&mut p, &mut [&mut c], &g).is_err());
    }

    #[test]
    fn test_gradient_shape_checked() {
        let solver = Sgd::default();
        let mut p = Tensor::new(2, 1, 1, 1);
        let mut v = Tensor::new(2, 1, 1, 1);
        let g = Tensor::new(3, 1, 1, 1);
        assert!(solver.update(&mut p, &mut [&mut v], &g).is_err());
    }
}

// ============================================================================
// Naming Tests
// ============================================================================

mod naming_tests {
    use super::*;

    #[test]
    fn test_kind_from_name() {
        assert_eq!(SolverKind::from_name("SGD"), Some(SolverKind::Sgd));
        assert_eq!(SolverKind::from_name("rms_prop"), Some(SolverKind::RmsProp));
        assert_eq!(SolverKind::from_name("ADADELTA"), Some(SolverKind::Adadelta));
        assert_eq!(SolverKind::from_name("adagrad"), Some(SolverKind::Adagrad));
        assert_eq!(SolverKind::from_name("ADAMAX"), Some(SolverKind::Adamax));
        assert_eq!(SolverKind::from_name("adam"), None);
    }

    #[test]
    fn test_cache_sizes() {
        assert_eq!(Sgd::default().cache_size(), 1);
        assert_eq!(RmsProp::default().cache_size(), 1);
        assert_eq!(Adadelta::default().cache_size(), 2);
        assert_eq!(Adagrad::default().cache_size(), 1);
        assert_eq!(Adamax::default().cache_size(), 2);
        assert_eq!(Sgd::default().name(), "SGD");
    }
}
