//! Random number generation for weight initialization and dropout masks.
//!
//! Wraps a seedable `StdRng` so that runs can be reproduced from a seed while
//! dropout masks can still be drawn from entropy when independence matters.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_distr::{Bernoulli, Distribution, Normal};

const DEFAULT_SEED: u64 = 0x9e37_79b9_7f4a_7c15;

/// Seedable generator used by layers and trainers.
#[derive(Debug, Clone)]
pub struct NetworkRng {
    inner: StdRng,
}

impl NetworkRng {
    /// Create a new RNG with explicit seed (if zero, use a fixed value).
    pub fn new(seed: u64) -> Self {
        let seed = if seed == 0 { DEFAULT_SEED } else { seed };
        Self {
            inner: StdRng::seed_from_u64(seed),
        }
    }

    /// Generator seeded from the operating system.
    pub fn from_entropy() -> Self {
        Self {
            inner: StdRng::from_entropy(),
        }
    }

    /// Derive an independent generator, advancing this one.
    pub fn fork(&mut self) -> Self {
        Self {
            inner: StdRng::seed_from_u64(self.inner.gen()),
        }
    }

    /// Uniform sample in [0, 1).
    pub fn next_f32(&mut self) -> f32 {
        self.inner.gen()
    }

    /// Draw from N(mean, stddev²). A non-positive stddev returns the mean.
    pub fn gaussian(&mut self, mean: f32, stddev: f32) -> f32 {
        match Normal::new(mean, stddev) {
            Ok(normal) if stddev > 0.0 => normal.sample(&mut self.inner),
            _ => mean,
        }
    }

    /// 1.0 with probability `p`, 0.0 otherwise. `p` is clamped to [0, 1].
    pub fn bernoulli(&mut self, p: f32) -> f32 {
        let p = f64::from(p.clamp(0.0, 1.0));
        match Bernoulli::new(p) {
            Ok(dist) if dist.sample(&mut self.inner) => 1.0,
            _ => 0.0,
        }
    }

    /// Fisher-Yates shuffle for usize slices.
    pub fn shuffle_usize(&mut self, data: &mut [usize]) {
        data.shuffle(&mut self.inner);
    }
}

impl Default for NetworkRng {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rng_deterministic() {
        let mut rng1 = NetworkRng::new(42);
        let mut rng2 = NetworkRng::new(42);

        for _ in 0..100 {
            assert_eq!(rng1.next_f32(), rng2.next_f32());
        }
    }

    #[test]
    fn test_rng_next_f32_range() {
        let mut rng = NetworkRng::new(12345);

        for _ in 0..1000 {
            let val = rng.next_f32();
            assert!((0.0..1.0).contains(&val));
        }
    }

    #[test]
    fn test_gaussian_statistics() {
        let mut rng = NetworkRng::new(7);
        let n = 20_000;
        let samples: Vec<f32> = (0..n).map(|_| rng.gaussian(0.0, 2.0)).collect();
        let mean = samples.iter().sum::<f32>() / n as f32;
        let var = samples.iter().map(|x| (x - mean) * (x - mean)).sum::<f32>() / n as f32;

        assert!(mean.abs() < 0.1);
        assert!((var.sqrt() - 2.0).abs() < 0.1);
    }

    #[test]
    fn test_gaussian_zero_stddev() {
        let mut rng = NetworkRng::new(7);
        assert_eq!(rng.gaussian(1.5, 0.0), 1.5);
    }

    #[test]
    fn test_bernoulli_extremes() {
        let mut rng = NetworkRng::new(3);
        for _ in 0..100 {
            assert_eq!(rng.bernoulli(0.0), 0.0);
            assert_eq!(rng.bernoulli(1.0), 1.0);
        }
    }

    #[test]
    fn test_fork_diverges() {
        let mut rng = NetworkRng::new(11);
        let mut a = rng.fork();
        let mut b = rng.fork();
        let sa: Vec<f32> = (0..10).map(|_| a.next_f32()).collect();
        let sb: Vec<f32> = (0..10).map(|_| b.next_f32()).collect();
        assert_ne!(sa, sb);
    }

    #[test]
    fn test_shuffle_usize() {
        let mut rng = NetworkRng::new(33333);
        let mut data: Vec<usize> = (0..10).collect();
        let original = data.clone();

        rng.shuffle_usize(&mut data);

        let mut sorted = data.clone();
        sorted.sort();
        assert_eq!(sorted, original);
        assert_ne!(data, original);
    }
}
