//! Fit-engine contract and the bounded retry combinator.
//!
//! The selection logic only needs two primitives from a minimiser:
//!
//! - `minimize`: one maximum-likelihood fit starting from the model's current
//!   parameters, leaving the model at the result
//! - `randomize`: a parameter vector drawn around a previous fit result
//!
//! Retries are composed on top of those by [`attempt`].

use crate::domain::{BinnedDataset, FitResult};
use crate::models::Model;

/// Maximum-likelihood fitting of a [`Model`] to a binned dataset.
pub trait FitEngine {
    /// Single fit from the model's current parameters.
    ///
    /// The model's parameters are left at the returned `params`.
    fn minimize(&mut self, model: &mut Model, data: &BinnedDataset) -> FitResult;

    /// Parameter vector drawn from the fit's parameter uncertainty.
    fn randomize(&mut self, reference: &FitResult) -> Vec<f64>;

    /// Fit with up to `max_retries` extra attempts.
    ///
    /// After each non-converged attempt the parameters are randomized around
    /// that attempt's own result. The last attempt's result is returned
    /// whatever its status.
    fn fit(&mut self, model: &mut Model, data: &BinnedDataset, max_retries: usize) -> FitResult {
        let mut state = (self, model);
        attempt(
            &mut state,
            max_retries,
            |(engine, model)| engine.minimize(model, data),
            FitResult::converged,
            |(engine, model), failed| {
                let values = engine.randomize(failed);
                model.set_params(&values);
            },
        )
    }

    /// Like [`FitEngine::fit`], but restarts are drawn around a fixed
    /// `reference` result (used for toys, where the data fit is the prior).
    fn fit_from_reference(
        &mut self,
        model: &mut Model,
        data: &BinnedDataset,
        max_retries: usize,
        reference: &FitResult,
    ) -> FitResult {
        let mut state = (self, model);
        attempt(
            &mut state,
            max_retries,
            |(engine, model)| engine.minimize(model, data),
            FitResult::converged,
            |(engine, model), _| {
                let values = engine.randomize(reference);
                model.set_params(&values);
            },
        )
    }
}

/// Run `op` once, then retry up to `max_retries` times while `ok` rejects the
/// outcome, calling `on_failure` with the rejected outcome before each retry.
///
/// The shared `state` is threaded through both closures so they can borrow the
/// same engine and model mutably in turn.
pub fn attempt<S, T>(
    state: &mut S,
    max_retries: usize,
    mut op: impl FnMut(&mut S) -> T,
    ok: impl Fn(&T) -> bool,
    mut on_failure: impl FnMut(&mut S, &T),
) -> T {
    let mut last = op(state);
    for _ in 0..max_retries {
        if ok(&last) {
            break;
        }
        on_failure(state, &last);
        last = op(state);
    }
    last
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedEngine;
    use super::*;
    use crate::domain::{FunctionFamily, Observable};

    fn model() -> Model {
        Model::new(
            "p_bern1",
            FunctionFamily::Bernstein,
            1,
            &Observable::new("m", 110.0, 170.0),
            vec![0.5],
        )
    }

    fn data() -> BinnedDataset {
        BinnedDataset::from_counts("d", 110.0, 170.0, vec![1.0; 4])
    }

    #[test]
    fn attempt_stops_at_first_success() {
        let mut calls = 0;
        let out = attempt(
            &mut calls,
            5,
            |c| {
                *c += 1;
                *c
            },
            |v| *v >= 2,
            |_, _| {},
        );
        assert_eq!(out, 2);
        assert_eq!(calls, 2);
    }

    #[test]
    fn attempt_returns_last_failure_after_budget() {
        let mut failures = Vec::new();
        let out = attempt(&mut failures, 2, |f| f.len() as i32 + 10, |_| false, |f, v| f.push(*v));
        assert_eq!(failures, vec![10, 11]);
        assert_eq!(out, 12);
    }

    #[test]
    fn fit_retries_until_converged() {
        let mut engine = ScriptedEngine::new(&[("p_bern1", 42.0)]);
        engine.failures_before_success = 2;
        let mut m = model();
        let res = engine.fit(&mut m, &data(), 3);
        assert!(res.converged());
        assert_eq!(engine.calls, 3);
        assert_eq!(res.nll, 42.0);
    }

    #[test]
    fn fit_gives_up_with_last_status() {
        let mut engine = ScriptedEngine::new(&[]);
        engine.failures_before_success = 10;
        let mut m = model();
        let res = engine.fit(&mut m, &data(), 3);
        assert!(!res.converged());
        assert_eq!(engine.calls, 4);
        assert_eq!(m.params(), res.params.as_slice());
    }
}
