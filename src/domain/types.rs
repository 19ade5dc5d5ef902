//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during the order search and best-index selection
//! - exported to the JSON output container
//! - printed in the results table / summary

use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Default observable range (GeV).
pub const DEFAULT_MASS_LOW: f64 = 110.0;
pub const DEFAULT_MASS_HIGH: f64 = 170.0;
/// Default blinded signal window (GeV).
pub const DEFAULT_BLIND_LOW: f64 = 120.0;
pub const DEFAULT_BLIND_HIGH: f64 = 130.0;
pub const DEFAULT_BINS: usize = 60;
pub const DEFAULT_MAX_ORDER: u32 = 6;
pub const DEFAULT_TOYS: usize = 1000;
pub const DEFAULT_TOY_SEED: u64 = 1234;
/// Nested-test probability below which an extra order is still significant.
pub const DEFAULT_TRUTH_THRESHOLD: f64 = 0.05;
/// Looser nested-test threshold for envelope membership.
pub const DEFAULT_ENVELOPE_THRESHOLD: f64 = 0.10;
/// Standalone goodness-of-fit p-value below which a function is "too poor".
pub const DEFAULT_GOF_THRESHOLD: f64 = 0.01;
/// Extra fit attempts after a non-converged fit (data fits).
pub const DEFAULT_FIT_RETRIES: usize = 3;
pub const DEFAULT_MAX_FIT_ITERS: u64 = 4000;

/// Fit status codes (0 means converged).
pub const FIT_OK: i32 = 0;
pub const FIT_MAX_ITERS: i32 = 1;
pub const FIT_ERROR: i32 = 3;
pub const FIT_NON_FINITE: i32 = 4;

/// Parametric background function family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FunctionFamily {
    Bernstein,
    Chebyshev,
    Exponential,
    PowerLaw,
    Laurent,
}

impl FunctionFamily {
    /// Families run when the user does not pick any.
    pub const DEFAULT_SET: [FunctionFamily; 4] = [
        FunctionFamily::Bernstein,
        FunctionFamily::Exponential,
        FunctionFamily::PowerLaw,
        FunctionFamily::Laurent,
    ];

    /// Human-readable label used in tables, plot names and summary keys.
    pub fn display_name(self) -> &'static str {
        match self {
            FunctionFamily::Bernstein => "Bernstein",
            FunctionFamily::Chebyshev => "Chebyshev",
            FunctionFamily::Exponential => "Exponential",
            FunctionFamily::PowerLaw => "PowerLaw",
            FunctionFamily::Laurent => "Laurent",
        }
    }

    /// Short tag used in model names (`<prefix>_<tag><order>`).
    pub fn model_tag(self) -> &'static str {
        match self {
            FunctionFamily::Bernstein => "bern",
            FunctionFamily::Chebyshev => "cheb",
            FunctionFamily::Exponential => "exp",
            FunctionFamily::PowerLaw => "pow",
            FunctionFamily::Laurent => "lau",
        }
    }

    /// Tag used in the `key = value` summary consumed by bias studies.
    pub fn summary_tag(self) -> &'static str {
        match self {
            FunctionFamily::Bernstein => "pol",
            FunctionFamily::Chebyshev => "cheb",
            FunctionFamily::Exponential => "exp",
            FunctionFamily::PowerLaw => "pow",
            FunctionFamily::Laurent => "lau",
        }
    }

    /// Default order-validity rule.
    ///
    /// Exponential and power-law sums are built from `(order + 1) / 2` terms, so
    /// only odd orders exist.
    pub fn accepts_order(self, order: u32) -> bool {
        if order == 0 {
            return false;
        }
        match self {
            FunctionFamily::Bernstein | FunctionFamily::Chebyshev | FunctionFamily::Laurent => true,
            FunctionFamily::Exponential | FunctionFamily::PowerLaw => order % 2 == 1,
        }
    }
}

impl std::fmt::Display for FunctionFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// The fitted observable and its range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observable {
    pub name: String,
    pub low: f64,
    pub high: f64,
}

impl Observable {
    pub fn new(name: impl Into<String>, low: f64, high: f64) -> Self {
        Self {
            name: name.into(),
            low,
            high,
        }
    }

    /// Closed containment `[low, high]`.
    pub fn contains(&self, x: f64) -> bool {
        x.is_finite() && x >= self.low && x <= self.high
    }
}

/// Blinded signal window (open interval).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlindWindow {
    pub low: f64,
    pub high: f64,
}

impl BlindWindow {
    pub fn contains(&self, x: f64) -> bool {
        x > self.low && x < self.high
    }
}

/// One (possibly weighted) observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub value: f64,
    pub weight: f64,
}

/// Unbinned dataset of one category.
#[derive(Debug, Clone, Serialize)]
pub struct Dataset {
    pub name: String,
    pub observable: Observable,
    pub entries: Vec<Entry>,
}

impl Dataset {
    /// Total weighted entry count.
    pub fn sum_entries(&self) -> f64 {
        self.entries.iter().map(|e| e.weight).sum()
    }

    /// Histogram the dataset into `nbins` equal-width bins over the observable range.
    pub fn binned(&self, name: impl Into<String>, nbins: usize) -> BinnedDataset {
        let nbins = nbins.max(1);
        let low = self.observable.low;
        let high = self.observable.high;
        let width = (high - low) / nbins as f64;

        let mut counts = vec![0.0; nbins];
        let mut sumw2 = vec![0.0; nbins];
        for e in &self.entries {
            if !self.observable.contains(e.value) {
                continue;
            }
            let idx = (((e.value - low) / width).floor() as usize).min(nbins - 1);
            counts[idx] += e.weight;
            sumw2[idx] += e.weight * e.weight;
        }

        BinnedDataset {
            name: name.into(),
            low,
            high,
            counts,
            sumw2,
        }
    }
}

/// Equal-width binned dataset; the view every fit works on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinnedDataset {
    pub name: String,
    pub low: f64,
    pub high: f64,
    pub counts: Vec<f64>,
    /// Per-bin sum of squared weights (equals `counts` for unit weights).
    pub sumw2: Vec<f64>,
}

impl BinnedDataset {
    /// Build from raw (unit-weight) counts, e.g. a toy.
    pub fn from_counts(name: impl Into<String>, low: f64, high: f64, counts: Vec<f64>) -> Self {
        let sumw2 = counts.clone();
        Self {
            name: name.into(),
            low,
            high,
            counts,
            sumw2,
        }
    }

    pub fn nbins(&self) -> usize {
        self.counts.len()
    }

    pub fn bin_width(&self) -> f64 {
        (self.high - self.low) / self.nbins().max(1) as f64
    }

    pub fn bin_edges(&self, i: usize) -> (f64, f64) {
        let w = self.bin_width();
        let lo = self.low + w * i as f64;
        (lo, lo + w)
    }

    pub fn bin_center(&self, i: usize) -> f64 {
        let (lo, hi) = self.bin_edges(i);
        0.5 * (lo + hi)
    }

    pub fn sum_entries(&self) -> f64 {
        self.counts.iter().sum()
    }

    pub fn sum_w2(&self) -> f64 {
        self.sumw2.iter().sum()
    }
}

/// Outcome of one fit attempt.
///
/// Ephemeral: produced per fit call and consumed by the caller. `params` is the
/// parameter vector the model was left at.
#[derive(Debug, Clone, PartialEq)]
pub struct FitResult {
    pub status: i32,
    pub nll: f64,
    pub params: Vec<f64>,
    /// Parameter covariance at the minimum, when the Hessian could be inverted.
    pub covariance: Option<Vec<Vec<f64>>>,
}

impl FitResult {
    pub fn converged(&self) -> bool {
        self.status == FIT_OK
    }
}

/// Nested-model (F-test) comparison between order `k` and a richer order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NestedTestOutcome {
    pub chi2: f64,
    pub ndof: u32,
    pub prob_asymptotic: f64,
    /// Toy-calibrated probability, present only when toys were run.
    pub prob_toys: Option<f64>,
}

impl NestedTestOutcome {
    /// The probability the order search acts on.
    pub fn probability(&self) -> f64 {
        self.prob_toys.unwrap_or(self.prob_asymptotic)
    }
}

/// Standalone goodness-of-fit result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GofOutcome {
    /// Observed chi-square, scaled to `bins - n_params` degrees of freedom.
    pub chi2: f64,
    pub ndof: i64,
    pub n_params: usize,
    pub prob: f64,
    pub used_toys: bool,
}

/// One line of the results table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResultRow {
    pub family: FunctionFamily,
    pub dof: u32,
    pub chi2: f64,
    pub prob: f64,
}

/// Truth and envelope orders chosen for one category.
///
/// Both maps keep insertion order so reports are reproducible.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerCategoryChoice {
    pub truth: Vec<(FunctionFamily, u32)>,
    pub envelope: Vec<(FunctionFamily, Vec<u32>)>,
}

impl PerCategoryChoice {
    /// Record a truth order; the first entry per family wins.
    pub fn insert_truth(&mut self, family: FunctionFamily, order: u32) {
        if self.truth_order(family).is_none() {
            self.truth.push((family, order));
        }
    }

    pub fn truth_order(&self, family: FunctionFamily) -> Option<u32> {
        self.truth.iter().find(|(f, _)| *f == family).map(|(_, o)| *o)
    }

    /// Append an envelope order to the family's list (created on first use).
    pub fn push_envelope(&mut self, family: FunctionFamily, order: u32) {
        match self.envelope.iter_mut().find(|(f, _)| *f == family) {
            Some((_, orders)) => orders.push(order),
            None => self.envelope.push((family, vec![order])),
        }
    }
}

/// A full run's configuration as understood by the selection engine.
///
/// Derived from CLI flags (plus defaults) and passed by reference everywhere;
/// nothing in the engine reads ambient state.
#[derive(Debug, Clone)]
pub struct FtestConfig {
    pub input: PathBuf,
    pub out_dir: PathBuf,
    pub categories: Vec<String>,
    /// When set, only this category index is processed.
    pub single_category: Option<usize>,
    /// Extension tag appended to model and output names.
    pub ext: String,
    pub observable: Observable,
    pub blind_window: BlindWindow,
    pub blind: bool,
    pub bins: usize,
    pub families: Vec<FunctionFamily>,

    /// Use toys for the nested-model test.
    pub ftest_toys: bool,
    pub n_toys: usize,
    pub toy_seed: u64,

    pub max_order: u32,
    pub truth_threshold: f64,
    pub envelope_threshold: f64,
    pub gof_threshold: f64,
    pub fit_retries: usize,
    /// Iteration limit of a single minimisation.
    pub max_fit_iters: u64,
    /// Scale the parameter covariance by `Σw²/Σw` for weighted data.
    pub sum_w2_error: bool,
    /// Scale the multi-pdf complexity penalty (penalty = factor × free params).
    pub penalty_factor: f64,

    pub plots: bool,
    pub verbose: bool,
}

impl Default for FtestConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::new(),
            out_dir: PathBuf::from("plots/fTest"),
            categories: Vec::new(),
            single_category: None,
            ext: "13TeV".to_string(),
            observable: Observable::new("CMS_higgs_mass", DEFAULT_MASS_LOW, DEFAULT_MASS_HIGH),
            blind_window: BlindWindow {
                low: DEFAULT_BLIND_LOW,
                high: DEFAULT_BLIND_HIGH,
            },
            blind: true,
            bins: DEFAULT_BINS,
            families: FunctionFamily::DEFAULT_SET.to_vec(),
            ftest_toys: false,
            n_toys: DEFAULT_TOYS,
            toy_seed: DEFAULT_TOY_SEED,
            max_order: DEFAULT_MAX_ORDER,
            truth_threshold: DEFAULT_TRUTH_THRESHOLD,
            envelope_threshold: DEFAULT_ENVELOPE_THRESHOLD,
            gof_threshold: DEFAULT_GOF_THRESHOLD,
            fit_retries: DEFAULT_FIT_RETRIES,
            max_fit_iters: DEFAULT_MAX_FIT_ITERS,
            sum_w2_error: true,
            penalty_factor: 0.5,
            plots: true,
            verbose: false,
        }
    }
}

impl FtestConfig {
    /// Categories to process, with their position in the full list.
    pub fn selected_categories(&self) -> Vec<(usize, &str)> {
        match self.single_category {
            Some(idx) => self
                .categories
                .get(idx)
                .map(|c| vec![(idx, c.as_str())])
                .unwrap_or_default(),
            None => self
                .categories
                .iter()
                .enumerate()
                .map(|(i, c)| (i, c.as_str()))
                .collect(),
        }
    }

    /// File-name suffix for single-category runs (`_<cat>`), empty otherwise.
    pub fn output_suffix(&self) -> String {
        match self.single_category.and_then(|i| self.categories.get(i)) {
            Some(cat) => format!("_{cat}"),
            None => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_and_power_law_reject_even_orders() {
        for family in [FunctionFamily::Exponential, FunctionFamily::PowerLaw] {
            assert!(family.accepts_order(1));
            assert!(!family.accepts_order(2));
            assert!(family.accepts_order(5));
        }
        assert!(FunctionFamily::Bernstein.accepts_order(2));
        assert!(!FunctionFamily::Laurent.accepts_order(0));
    }

    #[test]
    fn binning_drops_out_of_range_and_keeps_upper_edge() {
        let ds = Dataset {
            name: "data_obs_cat0".to_string(),
            observable: Observable::new("m", 0.0, 10.0),
            entries: vec![
                Entry { value: 0.5, weight: 1.0 },
                Entry { value: 9.99, weight: 2.0 },
                Entry { value: 10.0, weight: 1.0 },
                Entry { value: 12.0, weight: 1.0 },
            ],
        };
        let b = ds.binned("roohist", 5);
        assert_eq!(b.counts, vec![1.0, 0.0, 0.0, 0.0, 3.0]);
        assert_eq!(b.sumw2[4], 5.0);
        assert!((b.bin_center(0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn envelope_orders_keep_insertion_order() {
        let mut choice = PerCategoryChoice::default();
        choice.push_envelope(FunctionFamily::Laurent, 3);
        choice.push_envelope(FunctionFamily::Bernstein, 2);
        choice.push_envelope(FunctionFamily::Laurent, 1);
        choice.insert_truth(FunctionFamily::Laurent, 1);
        choice.insert_truth(FunctionFamily::Laurent, 4);

        assert_eq!(choice.envelope[0], (FunctionFamily::Laurent, vec![3, 1]));
        assert_eq!(choice.envelope[1], (FunctionFamily::Bernstein, vec![2]));
        assert_eq!(choice.truth_order(FunctionFamily::Laurent), Some(1));
    }

    #[test]
    fn single_category_selects_one_and_suffixes_outputs() {
        let config = FtestConfig {
            categories: vec!["a".to_string(), "b".to_string()],
            single_category: Some(1),
            ..FtestConfig::default()
        };
        assert_eq!(config.selected_categories(), vec![(1, "b")]);
        assert_eq!(config.output_suffix(), "_b");
    }
}
