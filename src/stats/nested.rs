//! Nested-model significance test.
//!
//! For a simpler model nested in a richer one, the improvement
//!
//! ```text
//! χ² = 2 (NLL_simple - NLL_rich)
//! ```
//!
//! is asymptotically χ²-distributed with `ndof` = difference in free
//! parameters. Optionally the distribution is calibrated with toys drawn from
//! the fitted simpler model.

use tracing::{debug, info};

use crate::domain::{BinnedDataset, FIT_NON_FINITE, NestedTestOutcome};
use crate::fit::{FitEngine, SnapshotGuard};
use crate::math::chi2_prob;
use crate::models::Model;
use crate::plot::{Diagnostics, NestedToyReport};
use crate::stats::toys::ToySimulator;

/// Attempts per toy fit: the first fit plus one randomized restart.
const TOY_FIT_RETRIES: usize = 1;

/// Clamp a nested-model chi-square.
///
/// Numerical noise can make a richer fit slightly worse than the simpler one.
/// The very first comparison of a search has no previous model and is left as is.
pub fn clamp_chi2(chi2: f64, has_previous: bool) -> f64 {
    if has_previous && chi2 < 0.0 { 0.0 } else { chi2 }
}

/// Asymptotic-only outcome.
pub fn asymptotic(chi2: f64, ndof: u32) -> NestedTestOutcome {
    NestedTestOutcome {
        chi2,
        ndof,
        prob_asymptotic: chi2_prob(chi2, i64::from(ndof)),
        prob_toys: None,
    }
}

/// Nested-model test configuration.
#[derive(Debug, Clone, Copy)]
pub struct NestedModelTest {
    pub use_toys: bool,
    pub n_toys: usize,
    pub seed: u64,
}

impl NestedModelTest {
    /// Probability that the observed improvement is a fluctuation.
    ///
    /// Without toys this is [`asymptotic`]. With toys, both models are refit to
    /// `data` once to serve as restart references, then `n_toys` pseudo-datasets
    /// are drawn from `simple` at the observed yield and fitted with both
    /// models. Toys where either fit fails are skipped. Both models end with the
    /// parameters they had after the reference fits.
    #[allow(clippy::too_many_arguments)]
    pub fn probability(
        &self,
        engine: &mut dyn FitEngine,
        simple: &mut Model,
        rich: &mut Model,
        data: &BinnedDataset,
        chi2: f64,
        ndof: u32,
        diagnostics: &mut dyn Diagnostics,
        plot_name: &str,
    ) -> NestedTestOutcome {
        let mut outcome = asymptotic(chi2, ndof);
        if !self.use_toys {
            return outcome;
        }

        let ref_simple = engine.minimize(simple, data);
        let ref_rich = engine.minimize(rich, data);
        let total = data.sum_entries();
        let toys = ToySimulator::new(self.seed);

        let mut simple = SnapshotGuard::new(simple);
        let mut rich = SnapshotGuard::new(rich);

        let mut toy_chi2 = Vec::with_capacity(self.n_toys);
        let mut status_simple = Vec::with_capacity(self.n_toys);
        let mut status_rich = Vec::with_capacity(self.n_toys);
        let mut n_pass = 0usize;

        for index in 0..self.n_toys {
            simple.reset();
            rich.reset();
            let Some(toy) = toys.fixed_yield(&simple, data, total, index) else {
                status_simple.push(FIT_NON_FINITE);
                status_rich.push(FIT_NON_FINITE);
                continue;
            };

            let fit_simple = engine.fit_from_reference(&mut simple, &toy, TOY_FIT_RETRIES, &ref_simple);
            let fit_rich = engine.fit_from_reference(&mut rich, &toy, TOY_FIT_RETRIES, &ref_rich);
            status_simple.push(fit_simple.status);
            status_rich.push(fit_rich.status);
            if !(fit_simple.converged() && fit_rich.converged()) {
                debug!(toy = index, simple = fit_simple.status, rich = fit_rich.status, "toy fit failed, skipped");
                continue;
            }

            let chi2_toy = 2.0 * (fit_simple.nll - fit_rich.nll);
            if chi2_toy >= chi2 {
                n_pass += 1;
            }
            toy_chi2.push(chi2_toy);
        }

        let prob = toy_fraction(n_pass, toy_chi2.len());
        info!(
            model = simple.name(),
            successes = toy_chi2.len(),
            toys = self.n_toys,
            prob,
            prob_asymptotic = outcome.prob_asymptotic,
            "nested test with toys"
        );

        diagnostics.nested_toys(&NestedToyReport {
            name: plot_name.to_string(),
            observed_chi2: chi2,
            ndof,
            toy_chi2,
            status_simple,
            status_rich,
            prob_toys: prob,
            prob_asymptotic: outcome.prob_asymptotic,
        });

        outcome.prob_toys = Some(prob);
        outcome
    }
}

/// Fraction of passing toys among successful ones; zero successes give 0.
pub fn toy_fraction(n_pass: usize, n_success: usize) -> f64 {
    if n_success == 0 {
        0.0
    } else {
        n_pass as f64 / n_success as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FIT_ERROR, FitResult, FunctionFamily, Observable};
    use crate::fit::SimplexEngine;
    use crate::plot::{NoDiagnostics, RecordingDiagnostics};

    fn obs() -> Observable {
        Observable::new("CMS_higgs_mass", 110.0, 170.0)
    }

    fn data() -> BinnedDataset {
        let truth = Model::new("t", FunctionFamily::Exponential, 1, &obs(), vec![-0.04]);
        let empty = BinnedDataset::from_counts("d", 110.0, 170.0, vec![0.0; 60]);
        let counts = truth
            .expected_counts(&empty, 3000.0)
            .unwrap()
            .into_iter()
            .map(f64::round)
            .collect();
        BinnedDataset::from_counts("roohist_data_mass_cat0", 110.0, 170.0, counts)
    }

    /// Engine whose every fit fails.
    struct FailingEngine;

    impl FitEngine for FailingEngine {
        fn minimize(&mut self, model: &mut Model, _data: &BinnedDataset) -> FitResult {
            FitResult {
                status: FIT_ERROR,
                nll: 0.0,
                params: model.params().to_vec(),
                covariance: None,
            }
        }

        fn randomize(&mut self, reference: &FitResult) -> Vec<f64> {
            reference.params.clone()
        }
    }

    #[test]
    fn chi2_clamped_only_with_previous_model() {
        assert_eq!(clamp_chi2(-0.3, true), 0.0);
        assert_eq!(clamp_chi2(-0.3, false), -0.3);
        assert_eq!(clamp_chi2(2.5, true), 2.5);
    }

    #[test]
    fn asymptotic_probability_is_non_increasing() {
        let mut last = 1.0;
        for i in 0..50 {
            let p = asymptotic(i as f64 * 0.5, 2).prob_asymptotic;
            assert!(p <= last);
            last = p;
        }
    }

    #[test]
    fn without_toys_returns_asymptotic() {
        let test = NestedModelTest {
            use_toys: false,
            n_toys: 10,
            seed: 1,
        };
        let mut a = Model::new("a", FunctionFamily::Bernstein, 1, &obs(), vec![0.5]);
        let mut b = Model::new("b", FunctionFamily::Bernstein, 2, &obs(), vec![0.5, 0.5]);
        let out = test.probability(&mut FailingEngine, &mut a, &mut b, &data(), 3.0, 1, &mut NoDiagnostics, "x");
        assert_eq!(out.prob_toys, None);
        assert_eq!(out.probability(), chi2_prob(3.0, 1));
    }

    #[test]
    fn zero_successful_toys_give_zero() {
        let test = NestedModelTest {
            use_toys: true,
            n_toys: 5,
            seed: 1,
        };
        let mut a = Model::new("a", FunctionFamily::Bernstein, 1, &obs(), vec![0.5]);
        let mut b = Model::new("b", FunctionFamily::Bernstein, 2, &obs(), vec![0.5, 0.5]);
        let mut diag = RecordingDiagnostics::default();
        let out = test.probability(&mut FailingEngine, &mut a, &mut b, &data(), 3.0, 1, &mut diag, "Ftest_from_Bernstein1_cat0_13TeV");
        assert_eq!(out.prob_toys, Some(0.0));
        assert_eq!(diag.nested[0].status_simple, vec![FIT_ERROR; 5]);
        assert_eq!(diag.names, vec!["Ftest_from_Bernstein1_cat0_13TeV".to_string()]);
    }

    #[test]
    fn toy_probability_is_a_fraction_and_parameters_return() {
        let test = NestedModelTest {
            use_toys: true,
            n_toys: 20,
            seed: 1234,
        };
        let d = data();
        let mut engine = SimplexEngine::new(3);
        let mut simple = Model::new("e1", FunctionFamily::Exponential, 1, &obs(), vec![-0.02]);
        let mut rich = Model::new("e3", FunctionFamily::Exponential, 3, &obs(), vec![-0.02, 0.5, -0.06]);
        let fit_s = engine.fit(&mut simple, &d, 3);
        let fit_r = engine.fit(&mut rich, &d, 3);
        let chi2 = clamp_chi2(2.0 * (fit_s.nll - fit_r.nll), true);

        let mut diag = RecordingDiagnostics::default();
        let out = test.probability(&mut engine, &mut simple, &mut rich, &d, chi2, 2, &mut diag, "toys");
        let p = out.prob_toys.unwrap();
        assert!((0.0..=1.0).contains(&p));

        // Parameters are back at the reference-fit values: refitting from them is a no-op.
        let again = engine.minimize(&mut simple, &d);
        assert!((again.nll - fit_s.nll).abs() < 1e-4);
        assert_eq!(diag.nested[0].status_rich.len(), 20);
    }

    #[test]
    fn toy_fraction_counts_successes_only() {
        assert_eq!(toy_fraction(0, 0), 0.0);
        assert_eq!(toy_fraction(3, 12), 0.25);
    }
}
