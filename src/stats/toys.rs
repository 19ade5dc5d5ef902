//! Binned pseudo-dataset generation.
//!
//! Toys are drawn from a reference model's bin probabilities:
//!
//! - `fixed_yield`: each bin `n_i ~ Poisson(N p_i)` around the observed yield `N`
//! - `fluctuated_yield`: `N' ~ Poisson(N)` first, then the bins around `N'`
//!
//! Toy `i` is drawn from its own generator seeded from `(seed, i)`, so a toy
//! can be regenerated on its own and runs are reproducible.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Poisson};

use crate::domain::BinnedDataset;
use crate::models::Model;

/// Odd 64-bit constant spreading consecutive toy indices over the seed space.
const SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

#[derive(Debug, Clone, Copy)]
pub struct ToySimulator {
    seed: u64,
}

impl ToySimulator {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    fn rng(&self, index: usize) -> StdRng {
        StdRng::seed_from_u64(self.seed.wrapping_add((index as u64).wrapping_mul(SEED_STRIDE)))
    }

    /// Toy `index` with Poisson bin counts around `total × p_i`.
    ///
    /// `template` fixes the binning. Returns `None` if the model cannot be
    /// normalized at its current parameters.
    pub fn fixed_yield(
        &self,
        model: &Model,
        template: &BinnedDataset,
        total: f64,
        index: usize,
    ) -> Option<BinnedDataset> {
        let probs = model.bin_probabilities(template)?;
        let mut rng = self.rng(index);
        Some(sample_bins(&probs, total, template, index, &mut rng))
    }

    /// Toy `index` whose total is itself Poisson-fluctuated around `expected_total`.
    pub fn fluctuated_yield(
        &self,
        model: &Model,
        template: &BinnedDataset,
        expected_total: f64,
        index: usize,
    ) -> Option<BinnedDataset> {
        let probs = model.bin_probabilities(template)?;
        let mut rng = self.rng(index);
        let total = poisson(expected_total, &mut rng);
        Some(sample_bins(&probs, total, template, index, &mut rng))
    }
}

fn sample_bins(
    probs: &[f64],
    total: f64,
    template: &BinnedDataset,
    index: usize,
    rng: &mut StdRng,
) -> BinnedDataset {
    let counts = probs.iter().map(|p| poisson(total * p, rng)).collect();
    BinnedDataset::from_counts(
        format!("toy_{index}_{}", template.name),
        template.low,
        template.high,
        counts,
    )
}

/// One Poisson draw; a non-positive or non-finite mean yields zero.
fn poisson(mean: f64, rng: &mut StdRng) -> f64 {
    if !(mean.is_finite() && mean > 0.0) {
        return 0.0;
    }
    match Poisson::new(mean) {
        Ok(dist) => dist.sample(rng),
        Err(_) => 0.0,
    }
}
