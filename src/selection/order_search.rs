//! Per-family order search.
//!
//! Two passes over increasing order:
//!
//! 1. Truth: keep adding order while the nested test says the extra freedom is
//!    significant (`prob < truth_threshold`). The truth is the simpler model of
//!    the last comparison.
//! 2. Envelope: the same walk with the looser `envelope_threshold` and the
//!    asymptotic test only. Every order still below the threshold gets a
//!    standalone goodness-of-fit test and joins the envelope if the fit is
//!    acceptable or it is the truth order.
//!
//! Orders the builder rejects are skipped. Fit failures are logged and their
//! values used anyway.

use tracing::{info, warn};

use crate::domain::{BinnedDataset, FunctionFamily, ResultRow};
use crate::math::chi2_prob;
use crate::models::Model;
use crate::plot::SingleFitReport;
use crate::selection::SearchContext;
use crate::stats::{GoodnessOfFitTest, NestedModelTest, clamp_chi2};

/// Outcome of the truth pass for one family.
#[derive(Debug, Clone)]
pub struct TruthOutcome {
    pub family: FunctionFamily,
    /// The cached model of the last comparison, if the search got that far.
    pub model: Option<Model>,
    /// Results-table row (`cache order + 1`, last chi-square, last probability).
    pub row: ResultRow,
}

impl TruthOutcome {
    pub fn order(&self) -> Option<u32> {
        self.model.as_ref().map(Model::order)
    }
}

/// A model retained in the envelope, with its data NLL.
#[derive(Debug, Clone)]
pub struct EnvelopeCandidate {
    pub model: Model,
    pub nll: f64,
}

/// Outcome of the envelope pass for one family.
#[derive(Debug, Clone, Default)]
pub struct EnvelopeOutcome {
    pub candidates: Vec<EnvelopeCandidate>,
    /// One row per fitted order.
    pub rows: Vec<ResultRow>,
}

impl EnvelopeOutcome {
    pub fn orders(&self) -> Vec<u32> {
        self.candidates.iter().map(|c| c.model.order()).collect()
    }
}

/// Order search over one category's binned data.
pub struct OrderSearch<'a> {
    pub category: &'a str,
    pub data: &'a BinnedDataset,
}

impl OrderSearch<'_> {
    pub fn truth(&self, ctx: &mut SearchContext<'_>, family: FunctionFamily) -> TruthOutcome {
        let config = ctx.config;
        let prefix = format!("ftest_pdf_{}_{}", self.category, config.ext);
        let nested = NestedModelTest {
            use_toys: config.ftest_toys,
            n_toys: config.n_toys,
            seed: config.toy_seed,
        };

        let mut order = 1;
        let mut prev: Option<Model> = None;
        let mut cache: Option<Model> = None;
        let mut prev_nll = 0.0;
        let mut chi2 = 0.0;
        let mut prob = 0.0;

        while prob < config.truth_threshold && order <= config.max_order {
            let Some(mut model) = ctx.builder.build(family, order, &prefix) else {
                order += 1;
                continue;
            };

            info!(category = self.category, model = model.name(), "perform the F-test");
            let fit = ctx.engine.fit(&mut model, self.data, config.fit_retries);
            if !fit.converged() {
                warn!(model = model.name(), status = fit.status, "fit did not converge");
            }

            chi2 = clamp_chi2(2.0 * (prev_nll - fit.nll), prev.is_some());
            prob = match prev.as_mut() {
                Some(simple) => {
                    let ndof = order - simple.order();
                    let plot = format!("Ftest_from_{family}{order}_{}_{}", self.category, config.ext);
                    nested
                        .probability(
                            &mut *ctx.engine,
                            simple,
                            &mut model,
                            self.data,
                            chi2,
                            ndof,
                            &mut *ctx.diagnostics,
                            &plot,
                        )
                        .probability()
                }
                None => 0.0,
            };

            info!(
                family = %family,
                order,
                prev_nll,
                nll = fit.nll,
                chi2,
                prob,
                "truth search step"
            );

            prev_nll = fit.nll;
            cache = prev.replace(model);
            order += 1;
        }

        let cache_order = cache.as_ref().map_or(0, Model::order);
        TruthOutcome {
            family,
            model: cache,
            row: ResultRow {
                family,
                dof: cache_order + 1,
                chi2,
                prob,
            },
        }
    }

    pub fn envelope(
        &self,
        ctx: &mut SearchContext<'_>,
        family: FunctionFamily,
        truth_order: Option<u32>,
    ) -> EnvelopeOutcome {
        let config = ctx.config;
        let prefix = format!("env_pdf_{}_{}", self.category, config.ext);
        let gof = GoodnessOfFitTest {
            n_toys: config.n_toys,
            seed: config.toy_seed,
        };
        let blind = config.blind.then_some(config.blind_window);

        info!(
            family = %family,
            category = self.category,
            threshold = config.envelope_threshold,
            "determining envelope functions"
        );

        let mut out = EnvelopeOutcome::default();
        let mut order = 1;
        let mut prev_order: Option<u32> = None;
        let mut prev_nll = 0.0;
        let mut prob = 0.0;

        while prob < config.envelope_threshold && order <= config.max_order {
            let Some(mut model) = ctx.builder.build(family, order, &prefix) else {
                order += 1;
                continue;
            };

            let fit = ctx.engine.fit(&mut model, self.data, config.fit_retries);
            if !fit.converged() {
                warn!(model = model.name(), status = fit.status, "fit did not converge");
            }

            let chi2 = clamp_chi2(2.0 * (prev_nll - fit.nll), prev_order.is_some());
            prob = match prev_order {
                Some(prev) => chi2_prob(chi2, i64::from(order - prev)),
                None => 0.0,
            };
            info!(family = %family, order, prev_nll, nll = fit.nll, chi2, prob, "envelope search step");

            let cache_order = prev_order.unwrap_or(0);
            prev_nll = fit.nll;

            if prob < config.envelope_threshold {
                let stem = format!("single_fit/{family}{order}_{}_{}", self.category, config.ext);
                let g = gof.evaluate(
                    &mut *ctx.engine,
                    &mut model,
                    self.data,
                    &mut *ctx.diagnostics,
                    &format!("{stem}_gofTest"),
                );
                ctx.diagnostics.single_fit(&SingleFitReport {
                    name: stem,
                    model: &model,
                    data: self.data,
                    chi2: g.chi2,
                    gof_prob: g.prob,
                    status: fit.status,
                    blind,
                });

                if g.prob > config.gof_threshold || truth_order == Some(order) {
                    info!(
                        model = model.name(),
                        gof = g.prob,
                        score = 2.0 * fit.nll + model.param_count() as f64,
                        "adding to envelope"
                    );
                    out.candidates.push(EnvelopeCandidate { model, nll: fit.nll });
                }
                prev_order = Some(order);
                order += 1;
            }

            out.rows.push(ResultRow {
                family,
                dof: cache_order + 1,
                chi2,
                prob,
            });
        }

        out
    }
}
