//! Numeric verification of accumulated weight gradients.
//!
//! A [`TensorGradientChecker`] walks a weight tensor element by element,
//! letting the caller perturb the current element and record the finite
//! difference derivative, which is then compared with the matching element
//! of the accumulated delta tensor.

use crate::tensor::SharedTensor;

pub struct TensorGradientChecker {
    weights: SharedTensor,
    deltas: SharedTensor,
    index: usize,
    stored: f32,
    numeric: f32,
}

impl TensorGradientChecker {
    pub fn new(weights: SharedTensor, deltas: SharedTensor) -> Self {
        Self {
            weights,
            deltas,
            index: 0,
            stored: 0.0,
            numeric: 0.0,
        }
    }

    /// Number of scalar parameters walked.
    pub fn size(&self) -> usize {
        self.weights.read().size()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// `(x, y, d1, d2)` of the current element.
    pub fn position(&self) -> (usize, usize, usize, usize) {
        let weights = self.weights.read();
        let matrix = weights.matrix_size().max(1);
        let (m, offset) = (self.index / matrix, self.index % matrix);
        let height = weights.height().max(1);
        let depth2 = weights.depth2().max(1);
        (offset / height, offset % height, m / depth2, m % depth2)
    }

    /// Remember the current element before perturbing it.
    pub fn store(&mut self) {
        self.stored = self.weights.read().data()[self.index];
    }

    /// Set the current element to the stored value plus `delta`.
    pub fn modify(&mut self, delta: f32) {
        self.weights.write().data_mut()[self.index] = self.stored + delta;
    }

    pub fn restore(&mut self) {
        self.weights.write().data_mut()[self.index] = self.stored;
    }

    /// Record the finite difference derivative of the current element.
    pub fn set_grad(&mut self, numeric: f32) {
        self.numeric = numeric;
    }

    pub fn numeric(&self) -> f32 {
        self.numeric
    }

    /// Accumulated delta of the current element.
    pub fn analytic(&self) -> f32 {
        self.deltas.read().data()[self.index]
    }

    /// Advance to the next element; false once past the end.
    pub fn next(&mut self) -> bool {
        self.index += 1;
        self.index < self.size()
    }

    pub fn reset(&mut self) {
        self.index = 0;
    }

    /// `|a - n|` for the current element.
    pub fn abs_error(&self) -> f32 {
        (self.analytic() - self.numeric).abs()
    }

    /// `|a - n| / max(|a|, |n|)`, zero when both vanish.
    pub fn error(&self) -> f32 {
        let (a, n) = (self.analytic(), self.numeric);
        let scale = a.abs().max(n.abs());
        if scale == 0.0 {
            0.0
        } else {
            (a - n).abs() / scale
        }
    }
}

/// Outcome of the check for one trainable layer.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerGradientReport {
    pub layer: String,
    pub parameters: usize,
    pub max_abs_error: f32,
    pub max_relative_error: f32,
    /// Parameters whose absolute error exceeded the tolerance.
    pub discrepancies: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GradientCheckReport {
    pub layers: Vec<LayerGradientReport>,
}

impl GradientCheckReport {
    pub fn max_abs_error(&self) -> f32 {
        self.layers
            .iter()
            .map(|l| l.max_abs_error)
            .fold(0.0, f32::max)
    }

    pub fn discrepancies(&self) -> usize {
        self.layers.iter().map(|l| l.discrepancies).sum()
    }

    pub fn is_consistent(&self) -> bool {
        self.discrepancies() == 0
    }
}
