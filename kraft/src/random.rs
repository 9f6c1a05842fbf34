//! Injectable random source.
//!
//! Every probabilistic decision (whether to evolve, add vs. drop, whether and
//! how to mutate, which ids and columns to touch) draws from a [`RandomSource`]
//! handed in by the caller. Production code uses a seeded [`StdRng`]; tests can
//! substitute a scripted source to pin each draw in call order.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// The draws the simulator needs.
pub trait RandomSource {
    /// Uniform draw from `[0, 1)`.
    fn unit(&mut self) -> f64;

    /// Uniform index in `0..len`. `len` must be non-zero.
    fn index(&mut self, len: usize) -> usize;

    /// `amount` distinct indices from `0..len`, without replacement.
    ///
    /// `amount` must not exceed `len`.
    fn choose_indices(&mut self, len: usize, amount: usize) -> Vec<usize>;
}

impl RandomSource for StdRng {
    fn unit(&mut self) -> f64 {
        self.random::<f64>()
    }

    fn index(&mut self, len: usize) -> usize {
        self.random_range(0..len)
    }

    fn choose_indices(&mut self, len: usize, amount: usize) -> Vec<usize> {
        rand::seq::index::sample(self, len, amount).into_vec()
    }
}

impl<R: RandomSource + ?Sized> RandomSource for &mut R {
    fn unit(&mut self) -> f64 {
        (**self).unit()
    }

    fn index(&mut self, len: usize) -> usize {
        (**self).index(len)
    }

    fn choose_indices(&mut self, len: usize, amount: usize) -> Vec<usize> {
        (**self).choose_indices(len, amount)
    }
}

impl<R: RandomSource + ?Sized> RandomSource for Box<R> {
    fn unit(&mut self) -> f64 {
        (**self).unit()
    }

    fn index(&mut self, len: usize) -> usize {
        (**self).index(len)
    }

    fn choose_indices(&mut self, len: usize, amount: usize) -> Vec<usize> {
        (**self).choose_indices(len, amount)
    }
}

/// Create a seeded source.
#[must_use]
pub fn seeded(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}
