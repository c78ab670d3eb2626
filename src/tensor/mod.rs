//! Four dimensional tensor and the operations defined over it.
//!
//! A [`Tensor`] is a `depth1 × depth2` grid of `width × height` matrices.
//! `depth2` indexes feature maps, `depth1` is the replication level used by
//! filter banks to iterate over the input feature maps.
//!
//! Matrix elements are addressed as `(x, y)` with `x < width` and `y < height`
//! and stored row-major (`x * height + y`). Matrices are stored one after the
//! other, `depth2` varying fastest.

pub mod operation;
pub mod tank;

use crate::error::{NetworkError, Result};
use crate::utils::rng::NetworkRng;
use std::fmt;
use std::ops::{DivAssign, MulAssign};

pub use operation::{ConvolutionMode, KernelMode, PadMode};
pub use tank::{
    shared, DeltaGroup, Initializer, Parameter, ParameterAllocator, SharedTensor, TensorTank,
};

/// Dense 4D tensor of `f32`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tensor {
    width: usize,
    height: usize,
    depth1: usize,
    depth2: usize,
    data: Vec<f32>,
}

impl Tensor {
    /// Zero-filled tensor of the given shape.
    pub fn new(width: usize, height: usize, depth1: usize, depth2: usize) -> Self {
        Self {
            width,
            height,
            depth1,
            depth2,
            data: vec![0.0; width * height * depth1 * depth2],
        }
    }

    /// Tensor of the given shape with every element set to `value`.
    pub fn filled(width: usize, height: usize, depth1: usize, depth2: usize, value: f32) -> Self {
        let mut tensor = Self::new(width, height, depth1, depth2);
        tensor.fill_value(value);
        tensor
    }

    /// Build a tensor from raw storage in the crate's layout.
    pub fn from_data(
        width: usize,
        height: usize,
        depth1: usize,
        depth2: usize,
        data: Vec<f32>,
    ) -> Result<Self> {
        if data.len() != width * height * depth1 * depth2 {
            return Err(NetworkError::InvalidFillSize);
        }
        Ok(Self {
            width,
            height,
            depth1,
            depth2,
            data,
        })
    }

    /// Reshape and reset every element to zero.
    pub fn resize(&mut self, width: usize, height: usize, depth1: usize, depth2: usize) {
        self.width = width;
        self.height = height;
        self.depth1 = depth1;
        self.depth2 = depth2;
        self.data.clear();
        self.data.resize(width * height * depth1 * depth2, 0.0);
    }

    /// Matrix width (x extent).
    pub fn width(&self) -> usize {
        self.width
    }

    /// Matrix height (y extent).
    pub fn height(&self) -> usize {
        self.height
    }

    /// Replication depth, e.g. the input maps a filter bank walks.
    pub fn depth1(&self) -> usize {
        self.depth1
    }

    /// Feature map depth.
    pub fn depth2(&self) -> usize {
        self.depth2
    }

    /// `(width, height, depth1, depth2)`
    pub fn shape(&self) -> (usize, usize, usize, usize) {
        (self.width, self.height, self.depth1, self.depth2)
    }

    /// Number of elements in one matrix.
    pub fn matrix_size(&self) -> usize {
        self.width * self.height
    }

    /// Total number of elements.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn same_shape(&self, other: &Tensor) -> bool {
        self.shape() == other.shape()
    }

    fn matrix_offset(&self, d1: usize, d2: usize) -> usize {
        debug_assert!(d1 < self.depth1 && d2 < self.depth2);
        (d1 * self.depth2 + d2) * self.matrix_size()
    }

    /// Read-only view of matrix `(d1, d2)`.
    pub fn matrix(&self, d1: usize, d2: usize) -> &[f32] {
        let offset = self.matrix_offset(d1, d2);
        &self.data[offset..offset + self.matrix_size()]
    }

    /// Mutable view of matrix `(d1, d2)`.
    pub fn matrix_mut(&mut self, d1: usize, d2: usize) -> &mut [f32] {
        let offset = self.matrix_offset(d1, d2);
        let len = self.matrix_size();
        &mut self.data[offset..offset + len]
    }

    /// Element `(x, y)` of matrix `(d1, d2)`.
    ///
    /// # Panics
    ///
    /// When an index is out of range.
    pub fn get(&self, d1: usize, d2: usize, x: usize, y: usize) -> f32 {
        self.matrix(d1, d2)[x * self.height + y]
    }

    /// Write element `(x, y)` of matrix `(d1, d2)`.
    pub fn set(&mut self, d1: usize, d2: usize, x: usize, y: usize, value: f32) {
        let height = self.height;
        self.matrix_mut(d1, d2)[x * height + y] = value;
    }

    /// Every matrix, sequentially in `d1 * depth2 + d2` order.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Copy `data` into matrix `(d1, d2)`; the length must match the matrix size.
    pub fn fill(&mut self, d1: usize, d2: usize, data: &[f32]) -> Result<()> {
        if data.len() != self.matrix_size() || d1 >= self.depth1 || d2 >= self.depth2 {
            return Err(NetworkError::InvalidFillSize);
        }
        self.matrix_mut(d1, d2).copy_from_slice(data);
        Ok(())
    }

    /// Copy `data` across all matrices sequentially, starting at the first one.
    ///
    /// Shorter buffers leave the trailing elements untouched.
    pub fn grouped_fill(&mut self, data: &[f32]) -> Result<()> {
        if data.len() > self.size() {
            return Err(NetworkError::InvalidFillSize);
        }
        self.data[..data.len()].copy_from_slice(data);
        Ok(())
    }

    /// All matrices flattened in storage order.
    pub fn grouped_data(&self) -> Vec<f32> {
        self.data.clone()
    }

    /// Set every element to `value`.
    pub fn fill_value(&mut self, value: f32) {
        self.data.iter_mut().for_each(|v| *v = value);
    }

    /// Set every element to zero.
    pub fn clear(&mut self) {
        self.fill_value(0.0);
    }

    /// Gaussian initialization with standard deviation `1/sqrt(fan_in)`.
    pub fn fill_random(&mut self, rng: &mut NetworkRng, fan_in: usize) {
        let stddev = 1.0 / (fan_in.max(1) as f32).sqrt();
        for value in self.data.iter_mut() {
            *value = rng.gaussian(0.0, stddev);
        }
    }

    /// Draw one gaussian value per matrix and spread it over the whole matrix.
    pub fn uniform_fill_random(&mut self, rng: &mut NetworkRng, stddev: f32) {
        let len = self.matrix_size();
        if len == 0 {
            return;
        }
        for matrix in self.data.chunks_exact_mut(len) {
            let value = rng.gaussian(0.0, stddev);
            matrix.iter_mut().for_each(|v| *v = value);
        }
    }

    /// Reverse the element order of every matrix.
    pub fn flip(&mut self) {
        let len = self.matrix_size();
        if len == 0 {
            return;
        }
        for matrix in self.data.chunks_exact_mut(len) {
            matrix.reverse();
        }
    }

    /// Sum of absolute values.
    pub fn norm1(&self) -> f32 {
        self.data.iter().map(|v| v.abs()).sum()
    }

    /// Euclidean norm of all elements.
    pub fn norm2(&self) -> f32 {
        self.data.iter().map(|v| v * v).sum::<f32>().sqrt()
    }

    pub fn sum(&self) -> f32 {
        self.data.iter().sum()
    }

    /// In-place element-wise sum; shapes must match.
    pub fn accumulate(&mut self, other: &Tensor) -> Result<()> {
        if !self.same_shape(other) {
            return Err(NetworkError::InconsistentSize("accumulate"));
        }
        self.data
            .iter_mut()
            .zip(other.data.iter())
            .for_each(|(a, b)| *a += b);
        Ok(())
    }

    /// In-place element-wise product; shapes must match.
    pub fn elemul_assign(&mut self, other: &Tensor) -> Result<()> {
        if !self.same_shape(other) {
            return Err(NetworkError::InconsistentSize("elemul"));
        }
        self.data
            .iter_mut()
            .zip(other.data.iter())
            .for_each(|(a, b)| *a *= b);
        Ok(())
    }

    /// Apply `f` to every element in place.
    pub fn map_inplace<F: Fn(f32) -> f32>(&mut self, f: F) {
        self.data.iter_mut().for_each(|v| *v = f(*v));
    }

    /// Shape equality plus element comparison within `tolerance`.
    pub fn approx_eq(&self, other: &Tensor, tolerance: f32) -> bool {
        self.same_shape(other)
            && self
                .data
                .iter()
                .zip(other.data.iter())
                .all(|(a, b)| (a - b).abs() <= tolerance * a.abs().max(b.abs()).max(1.0))
    }
}

impl MulAssign<f32> for Tensor {
    fn mul_assign(&mut self, rhs: f32) {
        self.data.iter_mut().for_each(|v| *v *= rhs);
    }
}

impl DivAssign<f32> for Tensor {
    fn div_assign(&mut self, rhs: f32) {
        self.data.iter_mut().for_each(|v| *v /= rhs);
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "tensor {}x{}x{}x{}",
            self.width, self.height, self.depth1, self.depth2
        )?;
        for d1 in 0..self.depth1 {
            for d2 in 0..self.depth2 {
                writeln!(f, "[{}][{}]", d1, d2)?;
                let matrix = self.matrix(d1, d2);
                for x in 0..self.width {
                    let row = &matrix[x * self.height..(x + 1) * self.height];
                    let line: Vec<String> = row.iter().map(|v| format!("{:.6}", v)).collect();
                    writeln!(f, "{}", line.join(" "))?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resize_zeroes() {
        let mut t = Tensor::filled(2, 2, 1, 1, 3.0);
        t.resize(3, 2, 1, 2);
        assert_eq!(t.shape(), (3, 2, 1, 2));
        assert_eq!(t.size(), 12);
        assert!(t.data().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_row_major_layout() {
        let mut t = Tensor::new(2, 3, 1, 2);
        t.set(0, 1, 1, 2, 5.0);
        assert_eq!(t.matrix(0, 1)[1 * 3 + 2], 5.0);
        assert_eq!(t.data()[6 + 5], 5.0);
        assert_eq!(t.get(0, 1, 1, 2), 5.0);
    }

    #[test]
    fn test_fill_rejects_wrong_size() {
        let mut t = Tensor::new(2, 2, 1, 1);
        assert!(matches!(
            t.fill(0, 0, &[1.0, 2.0, 3.0]),
            Err(NetworkError::InvalidFillSize)
        ));
        t.fill(0, 0, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(t.sum(), 10.0);
    }

    #[test]
    fn test_grouped_fill_partial() {
        let mut t = Tensor::new(2, 1, 1, 2);
        t.grouped_fill(&[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(t.data(), &[1.0, 2.0, 3.0, 0.0]);
        assert!(t.grouped_fill(&[0.0; 5]).is_err());
    }

    #[test]
    fn test_flip_reverses_each_matrix() {
        let mut t = Tensor::from_data(2, 2, 1, 2, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0])
            .unwrap();
        t.flip();
        assert_eq!(t.data(), &[4.0, 3.0, 2.0, 1.0, 8.0, 7.0, 6.0, 5.0]);
    }

    #[test]
    fn test_uniform_fill_random_constant_per_matrix() {
        let mut rng = NetworkRng::new(5);
        let mut t = Tensor::new(3, 3, 1, 4);
        t.uniform_fill_random(&mut rng, 1.0);
        for d2 in 0..4 {
            let m = t.matrix(0, d2);
            assert!(m.iter().all(|&v| v == m[0]));
        }
    }

    #[test]
    fn test_norms() {
        let t = Tensor::from_data(2, 1, 1, 1, vec![3.0, -4.0]).unwrap();
        assert_eq!(t.norm1(), 7.0);
        assert_eq!(t.norm2(), 5.0);
        assert_eq!(t.sum(), -1.0);
    }
}
