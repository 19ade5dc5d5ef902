//! Standalone goodness-of-fit test.
//!
//! The statistic is a binned chi-square against the extended model (shape plus
//! a yield fixed at the data total):
//!
//! - empty bins are skipped
//! - each residual is divided by the Poisson error on the side of the model
//!   (`sqrt(Σw²)` for weighted data)
//! - the sum is reduced by `(non-empty bins − P)` with `P = shape params + 1`
//!
//! The reported chi-square is the reduced value times `B − P`, and the
//! asymptotic p-value uses `B − P` degrees of freedom. Sparse data
//! (`N / B < 5`) are calibrated with toys instead.

use tracing::{debug, info};

use crate::domain::{BinnedDataset, GofOutcome};
use crate::fit::{FitEngine, SnapshotGuard};
use crate::math::{chi2_prob, poisson_errors};
use crate::models::Model;
use crate::plot::{Diagnostics, GofToyReport};
use crate::stats::toys::ToySimulator;

/// Mean entries per bin below which the asymptotic p-value is not trusted.
pub const MIN_MEAN_PER_BIN: f64 = 5.0;

/// Goodness-of-fit configuration.
#[derive(Debug, Clone, Copy)]
pub struct GoodnessOfFitTest {
    pub n_toys: usize,
    pub seed: u64,
}

impl GoodnessOfFitTest {
    /// Goodness of fit of `model` at its current (fitted) parameters.
    ///
    /// The model's parameters are unchanged on return.
    pub fn evaluate(
        &self,
        engine: &mut dyn FitEngine,
        model: &mut Model,
        data: &BinnedDataset,
        diagnostics: &mut dyn Diagnostics,
        plot_name: &str,
    ) -> GofOutcome {
        let n_params = model.param_count() + 1;
        let nbins = data.nbins() as i64;
        let ndof = nbins - n_params as i64;
        let total = data.sum_entries();

        let Some(reduced) = reduced_chi2(model, data, n_params) else {
            debug!(model = model.name(), "chi-square undefined, GOF probability set to 0");
            return GofOutcome {
                chi2: f64::INFINITY,
                ndof,
                n_params,
                prob: 0.0,
                used_toys: false,
            };
        };
        let observed = reduced * ndof as f64;

        if total / data.nbins().max(1) as f64 >= MIN_MEAN_PER_BIN {
            return GofOutcome {
                chi2: observed,
                ndof,
                n_params,
                prob: chi2_prob(observed, ndof),
                used_toys: false,
            };
        }

        info!(model = model.name(), n_params, "few entries, running toys for GOF test");
        let toys = ToySimulator::new(self.seed);
        let mut model = SnapshotGuard::new(model);
        let mut toy_chi2 = Vec::with_capacity(self.n_toys);
        let mut n_pass = 0usize;

        for index in 0..self.n_toys {
            model.reset();
            let Some(toy) = toys.fluctuated_yield(&model, data, total, index) else {
                continue;
            };
            engine.minimize(&mut model, &toy);
            let Some(reduced_toy) = reduced_chi2(&model, &toy, n_params) else {
                continue;
            };
            if reduced_toy >= reduced {
                n_pass += 1;
            }
            toy_chi2.push(reduced_toy * ndof as f64);
        }

        let prob = if self.n_toys == 0 {
            0.0
        } else {
            n_pass as f64 / self.n_toys as f64
        };

        diagnostics.gof_toys(&GofToyReport {
            name: plot_name.to_string(),
            observed_chi2: observed,
            toy_chi2,
        });

        GofOutcome {
            chi2: observed,
            ndof,
            n_params,
            prob,
            used_toys: true,
        }
    }
}

/// Chi-square per degree of freedom of `model` against `data`.
///
/// `None` when the model cannot be normalized or fewer non-empty bins than
/// parameters remain.
pub fn reduced_chi2(model: &Model, data: &BinnedDataset, n_params: usize) -> Option<f64> {
    let expected = model.expected_counts(data, data.sum_entries())?;
    let weighted = data.counts != data.sumw2;

    let mut sum = 0.0;
    let mut used = 0usize;
    for ((&n, &w2), &mu) in data.counts.iter().zip(&data.sumw2).zip(&expected) {
        if n == 0.0 {
            continue;
        }
        let err = if weighted {
            w2.sqrt()
        } else {
            let (low, high) = poisson_errors(n);
            if n > mu { low } else { high }
        };
        if err <= 0.0 {
            continue;
        }
        sum += ((n - mu) / err).powi(2);
        used += 1;
    }

    let dof = used as i64 - n_params as i64;
    if dof <= 0 {
        return None;
    }
    Some(sum / dof as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FunctionFamily, Observable};
    use crate::fit::SimplexEngine;
    use crate::plot::{NoDiagnostics, RecordingDiagnostics};

    fn obs() -> Observable {
        Observable::new("CMS_higgs_mass", 110.0, 170.0)
    }

    fn truth() -> Model {
        Model::new("env_pdf_cat0_13TeV_exp1", FunctionFamily::Exponential, 1, &obs(), vec![-0.035])
    }

    fn asimov(total: f64) -> BinnedDataset {
        let empty = BinnedDataset::from_counts("d", 110.0, 170.0, vec![0.0; 60]);
        let counts = truth()
            .expected_counts(&empty, total)
            .unwrap()
            .into_iter()
            .map(f64::round)
            .collect();
        BinnedDataset::from_counts("roohist_data_mass_cat0", 110.0, 170.0, counts)
    }

    fn gof() -> GoodnessOfFitTest {
        GoodnessOfFitTest { n_toys: 50, seed: 1234 }
    }

    #[test]
    fn perfect_dataset_has_high_probability() {
        let data = asimov(20_000.0);
        let mut model = truth();
        let out = gof().evaluate(&mut SimplexEngine::new(0), &mut model, &data, &mut NoDiagnostics, "gof");
        assert!(!out.used_toys);
        assert_eq!(out.ndof, 58);
        assert_eq!(out.n_params, 2);
        assert!(out.prob > 0.5, "prob {}", out.prob);
    }

    #[test]
    fn wrong_shape_fails() {
        let data = asimov(20_000.0);
        let mut flat = Model::new("flat", FunctionFamily::Bernstein, 1, &obs(), vec![1.0]);
        let out = gof().evaluate(&mut SimplexEngine::new(0), &mut flat, &data, &mut NoDiagnostics, "gof");
        assert!(out.prob < 0.01, "prob {}", out.prob);
    }

    #[test]
    fn sparse_data_uses_toys_and_restores_parameters() {
        let data = asimov(120.0);
        let mut model = truth();
        let before = model.params().to_vec();
        let mut diag = RecordingDiagnostics::default();
        let out = gof().evaluate(&mut SimplexEngine::new(0), &mut model, &data, &mut diag, "env_pdf_cat0_13TeV_exp1_gofTest");
        assert!(out.used_toys);
        assert!((0.0..=1.0).contains(&out.prob));
        assert_eq!(model.params(), before.as_slice());
        assert_eq!(diag.names, vec!["env_pdf_cat0_13TeV_exp1_gofTest".to_string()]);
    }

    #[test]
    fn empty_bins_are_skipped() {
        let mut counts = vec![0.0; 60];
        counts[0] = 10.0;
        let data = BinnedDataset::from_counts("d", 110.0, 170.0, counts);
        // One non-empty bin cannot support two parameters.
        assert!(reduced_chi2(&truth(), &data, 2).is_none());
    }
}
