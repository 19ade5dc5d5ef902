//! Best-index selection by penalized likelihood.
//!
//! Each candidate is refit from the same clean starting point and scored as
//! `NLL + correction`. The lowest score wins (first one on ties) and the set is
//! left at the parameters of that winning scan step.

use tracing::{debug, info};

use crate::domain::BinnedDataset;
use crate::error::AppError;
use crate::fit::{FitEngine, ParamStore};
use crate::selection::multipdf::CandidateSet;

#[derive(Debug, Clone, Copy)]
pub struct BestIndexSelector {
    pub max_retries: usize,
}

/// Winning index and the penalized NLL of every candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct BestIndex {
    pub index: usize,
    pub penalized_nll: Vec<f64>,
}

impl BestIndexSelector {
    pub fn select(
        &self,
        engine: &mut dyn FitEngine,
        set: &mut CandidateSet,
        data: &BinnedDataset,
    ) -> Result<BestIndex, AppError> {
        let clean = set.snapshot();
        let mut snap = clean.clone();
        let mut best = 0;
        let mut best_value = f64::INFINITY;
        let mut penalized_nll = Vec::with_capacity(set.len());

        for id in 0..set.len() {
            set.restore(&clean);
            set.select(id)?;
            let fit = engine.fit(set.active_mut(), data, self.max_retries);
            let value = fit.nll + set.correction();
            debug!(
                model = set.active().name(),
                status = fit.status,
                correction = set.correction(),
                value,
                "candidate refit"
            );
            penalized_nll.push(value);

            if value < best_value {
                best_value = value;
                snap = set.snapshot();
                best = id;
            }
        }

        set.select(best)?;
        set.restore(&snap);
        info!(
            multipdf = set.name(),
            index = best,
            model = set.active().name(),
            "best fit function"
        );

        Ok(BestIndex {
            index: best,
            penalized_nll,
        })
    }
}

/// Cross-check index: minimum of `2 NLL + parameter count` (first on ties).
pub fn simple_best_index(scores: impl IntoIterator<Item = (f64, usize)>) -> usize {
    let mut best = 0;
    let mut best_value = f64::INFINITY;
    for (i, (nll, params)) in scores.into_iter().enumerate() {
        let value = 2.0 * nll + params as f64;
        if value < best_value {
            best_value = value;
            best = i;
        }
    }
    best
}
