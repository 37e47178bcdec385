//! Percentage gate randomness

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

/// Source of the per-evaluation percentage draw
pub trait PercentageSampler: Send + Sync {
    /// Uniform draw in `[0, 100)`
    fn sample(&self) -> u8;
}

/// Process thread-local RNG; the default sampler
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRngSampler;

impl PercentageSampler for ThreadRngSampler {
    fn sample(&self) -> u8 {
        rand::thread_rng().gen_range(0..100)
    }
}

/// Reproducible sampler for tests and replays
#[derive(Debug)]
pub struct SeededSampler {
    rng: Mutex<StdRng>,
}

impl SeededSampler {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl PercentageSampler for SeededSampler {
    fn sample(&self) -> u8 {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        rng.gen_range(0..100)
    }
}

/// Whether an edge with `percentage` is admitted on this evaluation
///
/// 100 and above admit without drawing; 0 never admits.
pub fn admits(sampler: &dyn PercentageSampler, percentage: u8) -> bool {
    match percentage {
        0 => false,
        p if p >= 100 => true,
        p => sampler.sample() < p,
    }
}
