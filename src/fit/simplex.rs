//! Concrete fit engine: binned maximum likelihood minimised with Nelder–Mead.
//!
//! The likelihood is the multinomial binned NLL
//!
//! ```text
//! NLL(θ) = - Σ_i n_i ln p_i(θ)
//! ```
//!
//! where `p_i` is the model's normalized probability in bin `i`. The yield is
//! not a fit parameter: differences of this NLL between nested models equal
//! those of the extended likelihood at its best-fit normalization.
//!
//! After the minimum is found, the parameter covariance is estimated from a
//! central finite-difference Hessian. Randomized restarts draw from it.

use argmin::core::{CostFunction, Error as ArgminError, Executor, State, TerminationReason, TerminationStatus};
use argmin::solver::neldermead::NelderMead;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use tracing::debug;

use crate::domain::{
    BinnedDataset, DEFAULT_MAX_FIT_ITERS, FIT_ERROR, FIT_MAX_ITERS, FIT_NON_FINITE, FIT_OK, FitResult,
};
use crate::fit::engine::FitEngine;
use crate::math::{cholesky_lower, covariance_from_hessian};
use crate::models::{Model, ShapeSpec};

/// Cost returned for parameter points where the model cannot be normalized.
///
/// Nelder–Mead orders vertices by cost, so every evaluation must be finite.
const NLL_PENALTY: f64 = 1e30;

/// Binned NLL of one shape on one dataset, as an argmin problem.
#[derive(Debug, Clone, Copy)]
pub struct BinnedNll<'a> {
    spec: &'a ShapeSpec,
    data: &'a BinnedDataset,
}

impl<'a> BinnedNll<'a> {
    pub fn new(spec: &'a ShapeSpec, data: &'a BinnedDataset) -> Self {
        Self { spec, data }
    }

    /// NLL at `params`, or [`NLL_PENALTY`] where it is undefined.
    pub fn value(&self, params: &[f64]) -> f64 {
        let Some(probs) = self.spec.bin_probabilities(params, self.data) else {
            return NLL_PENALTY;
        };
        let nll: f64 = self
            .data
            .counts
            .iter()
            .zip(&probs)
            .filter(|(n, _)| **n > 0.0)
            .map(|(n, p)| -n * p.ln())
            .sum();
        if nll.is_finite() { nll } else { NLL_PENALTY }
    }
}

impl CostFunction for BinnedNll<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, param: &Self::Param) -> Result<Self::Output, ArgminError> {
        Ok(self.value(param))
    }
}

/// Nelder–Mead fit engine.
pub struct SimplexEngine {
    rng: StdRng,
    max_iters: u64,
    sd_tolerance: f64,
    /// Extra simplex restarts from the best point after a converged run.
    restarts: usize,
    /// Scale covariances by `Σw²/Σw` when the data carry non-unit weights.
    sum_w2_error: bool,
}

impl SimplexEngine {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            max_iters: DEFAULT_MAX_FIT_ITERS,
            sd_tolerance: 1e-9,
            restarts: 1,
            sum_w2_error: true,
        }
    }

    pub fn with_max_iters(mut self, max_iters: u64) -> Self {
        self.max_iters = max_iters;
        self
    }

    pub fn with_sum_w2_error(mut self, enabled: bool) -> Self {
        self.sum_w2_error = enabled;
        self
    }

    fn run_simplex(&self, problem: BinnedNll<'_>, start: &[f64]) -> Result<(Vec<f64>, f64, i32), ArgminError> {
        let solver = NelderMead::new(initial_simplex(start)).with_sd_tolerance(self.sd_tolerance)?;
        let res = Executor::new(problem, solver)
            .configure(|state| state.max_iters(self.max_iters))
            .run()?;
        let state = res.state();
        let best = state
            .get_best_param()
            .cloned()
            .ok_or_else(|| ArgminError::msg("simplex finished without a best point"))?;
        let status = match state.get_termination_status() {
            TerminationStatus::Terminated(TerminationReason::SolverConverged) => FIT_OK,
            TerminationStatus::Terminated(TerminationReason::MaxItersReached) => FIT_MAX_ITERS,
            _ => FIT_ERROR,
        };
        Ok((best, state.get_best_cost(), status))
    }

    fn covariance(&self, problem: &BinnedNll<'_>, params: &[f64]) -> Option<Vec<Vec<f64>>> {
        let mut cov = covariance_from_hessian(&finite_difference_hessian(problem, params))?;
        let data = problem.data;
        let sum_w = data.sum_entries();
        if self.sum_w2_error && sum_w > 0.0 && data.counts != data.sumw2 {
            let scale = data.sum_w2() / sum_w;
            for row in &mut cov {
                for v in row.iter_mut() {
                    *v *= scale;
                }
            }
        }
        Some(cov)
    }
}

impl FitEngine for SimplexEngine {
    fn minimize(&mut self, model: &mut Model, data: &BinnedDataset) -> FitResult {
        let spec = *model.spec();
        let problem = BinnedNll::new(&spec, data);
        let start = model.params().to_vec();

        if start.is_empty() {
            let nll = problem.value(&start);
            let status = if nll < NLL_PENALTY { FIT_OK } else { FIT_NON_FINITE };
            return FitResult {
                status,
                nll,
                params: start,
                covariance: None,
            };
        }

        let (mut params, mut nll, mut status) = match self.run_simplex(problem, &start) {
            Ok(out) => out,
            Err(err) => {
                debug!(model = model.name(), error = %err, "simplex failed");
                (start.clone(), problem.value(&start), FIT_ERROR)
            }
        };

        for _ in 0..self.restarts {
            if status != FIT_OK {
                break;
            }
            match self.run_simplex(problem, &params) {
                Ok((p, v, s)) if v <= nll => {
                    params = p;
                    nll = v;
                    status = s;
                }
                Ok(_) => {}
                Err(err) => debug!(model = model.name(), error = %err, "simplex restart failed"),
            }
        }

        if nll >= NLL_PENALTY {
            status = FIT_NON_FINITE;
        }
        let covariance = if status == FIT_NON_FINITE {
            None
        } else {
            self.covariance(&problem, &params)
        };

        model.set_params(&params);
        FitResult {
            status,
            nll,
            params,
            covariance,
        }
    }

    fn randomize(&mut self, reference: &FitResult) -> Vec<f64> {
        let n = reference.params.len();
        let z: Vec<f64> = (0..n).map(|_| self.rng.sample(StandardNormal)).collect();

        if let Some(l) = reference.covariance.as_deref().and_then(cholesky_lower) {
            return reference
                .params
                .iter()
                .enumerate()
                .map(|(i, p)| p + (0..=i).map(|k| l[i][k] * z[k]).sum::<f64>())
                .collect();
        }

        // No usable covariance: independent jitter scaled to each parameter.
        reference
            .params
            .iter()
            .zip(&z)
            .map(|(p, z)| p + z * (0.1 * p.abs()).max(0.05))
            .collect()
    }
}

/// Start vertex plus one step along each axis.
fn initial_simplex(start: &[f64]) -> Vec<Vec<f64>> {
    let mut simplex = Vec::with_capacity(start.len() + 1);
    simplex.push(start.to_vec());
    for i in 0..start.len() {
        let mut v = start.to_vec();
        v[i] += (0.2 * start[i].abs()).max(0.02);
        simplex.push(v);
    }
    simplex
}

/// Central finite-difference Hessian of the NLL at `x`.
fn finite_difference_hessian(problem: &BinnedNll<'_>, x: &[f64]) -> Vec<Vec<f64>> {
    let n = x.len();
    let h: Vec<f64> = x.iter().map(|v| 1e-3 * v.abs().max(0.1)).collect();
    let f0 = problem.value(x);
    let eval = |shifts: &[(usize, f64)]| {
        let mut p = x.to_vec();
        for &(i, d) in shifts {
            p[i] += d;
        }
        problem.value(&p)
    };

    let mut hess = vec![vec![0.0; n]; n];
    for i in 0..n {
        let fp = eval(&[(i, h[i])]);
        let fm = eval(&[(i, -h[i])]);
        hess[i][i] = (fp - 2.0 * f0 + fm) / (h[i] * h[i]);
        for j in 0..i {
            let fpp = eval(&[(i, h[i]), (j, h[j])]);
            let fpm = eval(&[(i, h[i]), (j, -h[j])]);
            let fmp = eval(&[(i, -h[i]), (j, h[j])]);
            let fmm = eval(&[(i, -h[i]), (j, -h[j])]);
            let v = (fpp - fpm - fmp + fmm) / (4.0 * h[i] * h[j]);
            hess[i][j] = v;
            hess[j][i] = v;
        }
    }
    hess
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FunctionFamily, Observable};

    fn obs() -> Observable {
        Observable::new("CMS_higgs_mass", 110.0, 170.0)
    }

    /// Asimov-like data: bin contents equal to the expectation of `truth`.
    fn asimov(truth: &Model, total: f64) -> BinnedDataset {
        let empty = BinnedDataset::from_counts("asimov", 110.0, 170.0, vec![0.0; 60]);
        let counts = truth.expected_counts(&empty, total).unwrap();
        BinnedDataset::from_counts("asimov", 110.0, 170.0, counts)
    }

    #[test]
    fn recovers_exponential_slope() {
        let truth = Model::new("t", FunctionFamily::Exponential, 1, &obs(), vec![-0.045]);
        let data = asimov(&truth, 5000.0);

        let mut model = Model::new("m", FunctionFamily::Exponential, 1, &obs(), vec![-0.01]);
        let mut engine = SimplexEngine::new(7);
        let res = engine.fit(&mut model, &data, 3);

        assert!(res.converged(), "status {}", res.status);
        assert!((model.params()[0] + 0.045).abs() < 1e-4, "{:?}", model.params());
        let cov = res.covariance.expect("covariance at the minimum");
        assert!(cov[0][0] > 0.0);
    }

    #[test]
    fn richer_model_never_fits_worse() {
        let truth = Model::new("t", FunctionFamily::Bernstein, 2, &obs(), vec![0.6, 0.2]);
        let data = asimov(&truth, 2000.0);
        let mut engine = SimplexEngine::new(1);

        let mut simple = Model::new("b1", FunctionFamily::Bernstein, 1, &obs(), vec![0.5]);
        let mut rich = Model::new("b2", FunctionFamily::Bernstein, 2, &obs(), vec![0.5, 0.5]);
        let r1 = engine.fit(&mut simple, &data, 3);
        let r2 = engine.fit(&mut rich, &data, 3);
        assert!(r2.nll <= r1.nll + 1e-6);
    }

    #[test]
    fn refit_from_minimum_reproduces_nll() {
        let truth = Model::new("t", FunctionFamily::PowerLaw, 1, &obs(), vec![-5.0]);
        let data = asimov(&truth, 1000.0);
        let mut engine = SimplexEngine::new(3);
        let mut model = Model::new("m", FunctionFamily::PowerLaw, 1, &obs(), vec![-2.0]);

        let first = engine.fit(&mut model, &data, 3);
        let second = engine.fit(&mut model, &data, 3);
        assert!((first.nll - second.nll).abs() < 1e-6);
    }

    #[test]
    fn degenerate_start_reports_non_finite() {
        let data = BinnedDataset::from_counts("d", 110.0, 170.0, vec![5.0; 60]);
        let problem_spec = ShapeSpec {
            family: FunctionFamily::Exponential,
            order: 1,
            low: 110.0,
            high: 170.0,
        };
        let problem = BinnedNll::new(&problem_spec, &data);
        assert_eq!(problem.value(&[1e6]), NLL_PENALTY);
    }

    #[test]
    fn randomize_without_covariance_jitters_every_parameter() {
        let mut engine = SimplexEngine::new(11);
        let reference = FitResult {
            status: FIT_OK,
            nll: 0.0,
            params: vec![1.0, -2.0, 0.0],
            covariance: None,
        };
        let drawn = engine.randomize(&reference);
        assert_eq!(drawn.len(), 3);
        assert!(drawn.iter().zip(&reference.params).all(|(a, b)| a != b));
    }

    #[test]
    fn sum_w2_scaling_applies_to_weighted_data() {
        let truth = Model::new("t", FunctionFamily::Exponential, 1, &obs(), vec![-0.03]);
        let unweighted = asimov(&truth, 4000.0);
        let mut weighted = unweighted.clone();
        for v in &mut weighted.sumw2 {
            *v *= 4.0;
        }

        let spec = *truth.spec();
        let engine = SimplexEngine::new(0);
        let a = engine.covariance(&BinnedNll::new(&spec, &unweighted), &[-0.03]).unwrap();
        let b = engine.covariance(&BinnedNll::new(&spec, &weighted), &[-0.03]).unwrap();
        assert!((b[0][0] / a[0][0] - 4.0).abs() < 1e-9);
    }
}
