//! Randomness port used by template selection and emoji sampling.

use rand::{rngs::StdRng, seq::index, Rng, SeedableRng};

pub trait RandomSource: Send {
    /// Uniform index in `0..len`. Returns 0 when `len == 0`.
    fn draw_uniform(&mut self, len: usize) -> usize;

    /// `amount` distinct indices from `0..pool_len` (clamped to `pool_len`).
    fn sample_without_replacement(&mut self, amount: usize, pool_len: usize) -> Vec<usize>;
}

fn draw_with<R: Rng + ?Sized>(rng: &mut R, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    rng.random_range(0..len)
}

fn sample_with<R: Rng + ?Sized>(rng: &mut R, amount: usize, pool_len: usize) -> Vec<usize> {
    index::sample(rng, pool_len, amount.min(pool_len)).into_vec()
}

/// Backed by the thread-local RNG.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn draw_uniform(&mut self, len: usize) -> usize {
        draw_with(&mut rand::rng(), len)
    }

    fn sample_without_replacement(&mut self, amount: usize, pool_len: usize) -> Vec<usize> {
        sample_with(&mut rand::rng(), amount, pool_len)
    }
}

/// Reproducible source for a given seed.
#[derive(Clone, Debug)]
pub struct SeededRandom {
    rng: StdRng,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl RandomSource for SeededRandom {
    fn draw_uniform(&mut self, len: usize) -> usize {
        draw_with(&mut self.rng, len)
    }

    fn sample_without_replacement(&mut self, amount: usize, pool_len: usize) -> Vec<usize> {
        sample_with(&mut self.rng, amount, pool_len)
    }
}

/// Deterministic source: always draws `index % len` and samples the leading
/// indices in order.
#[derive(Clone, Copy, Debug, Default)]
pub struct FixedRandom {
    index: usize,
}

impl FixedRandom {
    pub fn new(index: usize) -> Self {
        Self { index }
    }
}

impl RandomSource for FixedRandom {
    fn draw_uniform(&mut self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        self.index % len
    }

    fn sample_without_replacement(&mut self, amount: usize, pool_len: usize) -> Vec<usize> {
        (0..amount.min(pool_len)).collect()
    }
}
