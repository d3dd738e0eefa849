//! Seeded noise source for reproducible simulated sweeps.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::f64::consts::TAU;

/// ChaCha8 generator with a Gaussian helper.
pub struct SimRng {
    inner: ChaCha8Rng,
}

impl SimRng {
    /// Seeded generator, or one seeded from the OS when `seed` is `None`.
    pub fn new(seed: Option<u64>) -> Self {
        let inner = match seed {
            Some(s) => ChaCha8Rng::seed_from_u64(s),
            None => ChaCha8Rng::from_entropy(),
        };
        Self { inner }
    }

    /// Draw from `N(mean, std²)` with the Box–Muller transform.
    pub fn gaussian(&mut self, mean: f64, std: f64) -> f64 {
        // 1 - U keeps the logarithm's argument in (0, 1].
        let u1: f64 = 1.0 - self.inner.gen::<f64>();
        let u2: f64 = self.inner.gen();
        mean + std * (-2.0 * u1.ln()).sqrt() * (TAU * u2).cos()
    }
}

impl std::fmt::Debug for SimRng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimRng")
            .field("inner", &"<ChaCha8Rng>")
            .finish()
    }
}
