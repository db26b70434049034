//! Random draws for trajectories.
//!
//! Every random number a trajectory consumes goes through [`RandomSource`], so
//! a trajectory is a deterministic function of its source. [`TraitRng`] is the
//! seeded production source.

use rand::distributions::{Distribution, WeightedIndex};
use rand::prelude::*;

/// Source of the random draws used by the trajectory engine.
pub trait RandomSource {
    /// Uniform draw in `[0, 1)`.
    fn unit(&mut self) -> f64;

    /// Uniform index in `0..len`. `len` must be non-zero.
    fn index(&mut self, len: usize) -> usize;

    /// Standard normal draw.
    fn standard_normal(&mut self) -> f64;

    /// Uniform draw in `[low, high)`.
    fn uniform(&mut self, low: f64, high: f64) -> f64 {
        low + (high - low) * self.unit()
    }

    /// Uniform integer in `low..high`.
    fn integer(&mut self, low: u32, high: u32) -> u32 {
        low + self.index((high - low) as usize) as u32
    }

    /// Index drawn with probability proportional to `weights`.
    ///
    /// Returns `None` when the weights cannot form a distribution (empty,
    /// negative, non-finite or all zero).
    fn weighted(&mut self, weights: &[f64]) -> Option<usize> {
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return None;
        }
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return None;
        }

        let target = self.unit() * total;
        let mut cumulative = 0.0;
        let mut last_positive = None;
        for (i, &w) in weights.iter().enumerate() {
            if w <= 0.0 {
                continue;
            }
            cumulative += w;
            last_positive = Some(i);
            if target < cumulative {
                return Some(i);
            }
        }
        last_positive
    }
}

/// Seeded random number generator for trajectories.
pub struct TraitRng {
    rng: StdRng,
}

impl TraitRng {
    /// Create from seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Generate next u64 for seeding child RNGs.
    pub fn next_seed(&mut self) -> u64 {
        self.rng.r#gen()
    }
}

impl RandomSource for TraitRng {
    fn unit(&mut self) -> f64 {
        self.rng.r#gen::<f64>()
    }

    fn index(&mut self, len: usize) -> usize {
        self.rng.gen_range(0..len)
    }

    fn standard_normal(&mut self) -> f64 {
        self.rng.sample(rand_distr::StandardNormal)
    }

    fn uniform(&mut self, low: f64, high: f64) -> f64 {
        self.rng.gen_range(low..high)
    }

    fn integer(&mut self, low: u32, high: u32) -> u32 {
        self.rng.gen_range(low..high)
    }

    fn weighted(&mut self, weights: &[f64]) -> Option<usize> {
        WeightedIndex::new(weights)
            .ok()
            .map(|dist| dist.sample(&mut self.rng))
    }
}
