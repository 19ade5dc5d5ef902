//! Per-category orchestration.
//!
//! For one category:
//!
//! 1. bin the dataset (`roohist_data_mass_<cat>`)
//! 2. run the truth and envelope searches for every configured family
//! 3. assemble the envelope into a [`CandidateSet`]
//!    (`CMS_higgs_<cat>_<ext>_bkgshape`, index `pdfindex_<cat>_<ext>`)
//! 4. pick the best index by penalized likelihood and log the simple
//!    cross-check index
//! 5. hand the envelope to diagnostics
//!
//! Exports are left to the caller.

use serde::Serialize;
use tracing::info;

use crate::domain::{BinnedDataset, Dataset, FunctionFamily, PerCategoryChoice, ResultRow};
use crate::error::AppError;
use crate::plot::EnvelopeReport;
use crate::selection::best_index::{BestIndex, BestIndexSelector, simple_best_index};
use crate::selection::multipdf::CandidateSet;
use crate::selection::order_search::{EnvelopeCandidate, OrderSearch, TruthOutcome};
use crate::selection::SearchContext;

/// Background yield parameter stored next to the multi-pdf.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Normalization {
    pub name: String,
    pub value: f64,
    pub min: f64,
    pub max: f64,
}

/// Everything produced for one category.
#[derive(Debug, Clone)]
pub struct CategoryResult {
    pub index: usize,
    pub category: String,
    /// Results-table rows in output order (per family: truth row, then envelope rows).
    pub rows: Vec<ResultRow>,
    pub choice: PerCategoryChoice,
    pub multipdf: CandidateSet,
    pub best: BestIndex,
    pub simple_index: usize,
    pub norm: Normalization,
    pub binned: BinnedDataset,
    /// Copy of the input dataset, renamed `data_mass_<cat>`.
    pub unbinned: Dataset,
}

pub struct ModelSelectionDriver<'a> {
    ctx: SearchContext<'a>,
}

impl<'a> ModelSelectionDriver<'a> {
    pub fn new(ctx: SearchContext<'a>) -> Self {
        Self { ctx }
    }

    /// Full selection for one category.
    pub fn run_category(
        &mut self,
        index: usize,
        category: &str,
        dataset: &Dataset,
    ) -> Result<CategoryResult, AppError> {
        let config = self.ctx.config;
        let binned = bin_category(category, dataset, config.bins)?;
        let search = OrderSearch {
            category,
            data: &binned,
        };

        let mut rows = Vec::new();
        let mut choice = PerCategoryChoice::default();
        let mut candidates: Vec<EnvelopeCandidate> = Vec::new();

        for &family in &config.families {
            let truth = search.truth(&mut self.ctx, family);
            rows.push(truth.row);
            if let Some(order) = truth.order() {
                choice.insert_truth(family, order);
            }

            let envelope = search.envelope(&mut self.ctx, family, truth.order());
            rows.extend(envelope.rows.iter().copied());
            for order in envelope.orders() {
                choice.push_envelope(family, order);
            }
            candidates.extend(envelope.candidates);
        }

        let simple_index = simple_best_index(
            candidates
                .iter()
                .map(|c| (c.nll, c.model.param_count())),
        );

        let total = binned.sum_entries();
        let mut multipdf = CandidateSet::new(
            format!("CMS_higgs_{category}_{}_bkgshape", config.ext),
            format!("pdfindex_{category}_{}", config.ext),
            candidates.into_iter().map(|c| c.model).collect(),
            config.penalty_factor,
        )?;

        let best = BestIndexSelector {
            max_retries: config.fit_retries,
        }
        .select(&mut *self.ctx.engine, &mut multipdf, &binned)?;

        info!(
            multipdf = multipdf.name(),
            category,
            n_pdfs = multipdf.len(),
            best = best.index,
            model = multipdf.active().name(),
            "created multi-pdf"
        );
        info!(category, index = simple_index, "simple check of index");

        self.ctx.diagnostics.envelope(&EnvelopeReport {
            name: format!("multipdf_{category}_{}", config.ext),
            category,
            models: multipdf.models(),
            best: best.index,
            data: &binned,
            blind: config.blind.then_some(config.blind_window),
        });

        let mut unbinned = dataset.clone();
        unbinned.name = format!("data_mass_{category}");

        Ok(CategoryResult {
            index,
            category: category.to_string(),
            rows,
            choice,
            norm: Normalization {
                name: format!("{}_norm", multipdf.name()),
                value: total,
                min: 0.0,
                max: 3.0 * total,
            },
            multipdf,
            best,
            simple_index,
            binned,
            unbinned,
        })
    }

    /// Truth search only, one outcome per configured family.
    pub fn scan_category(&mut self, category: &str, dataset: &Dataset) -> Result<Vec<TruthOutcome>, AppError> {
        let config = self.ctx.config;
        let binned = bin_category(category, dataset, config.bins)?;
        let search = OrderSearch {
            category,
            data: &binned,
        };
        Ok(config
            .families
            .iter()
            .map(|&family: &FunctionFamily| search.truth(&mut self.ctx, family))
            .collect())
    }
}

fn bin_category(category: &str, dataset: &Dataset, bins: usize) -> Result<BinnedDataset, AppError> {
    let binned = dataset.binned(format!("roohist_data_mass_{category}"), bins);
    let total = binned.sum_entries();
    if !(total > 0.0) {
        return Err(AppError::new(
            3,
            format!("Dataset {} has no entries in the observable range.", dataset.name),
        ));
    }
    info!(dataset = %dataset.name, sum_entries = total, "opened data");
    Ok(binned)
}
