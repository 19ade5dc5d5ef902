//! Diagnostic plots.
//!
//! The selection engine hands finished numbers to a [`Diagnostics`] sink and
//! never waits on it: rendering problems are logged by the sink and do not
//! affect any statistic.

pub mod svg;

pub use svg::*;

use crate::domain::{BinnedDataset, BlindWindow};
use crate::models::Model;

/// Toy distribution of the nested-model chi-square.
#[derive(Debug, Clone)]
pub struct NestedToyReport {
    /// Plot stem, e.g. `Ftest_from_Bernstein2_cat0_13TeV`.
    pub name: String,
    pub observed_chi2: f64,
    pub ndof: u32,
    pub toy_chi2: Vec<f64>,
    /// Final fit status per toy for the simpler and the richer model.
    pub status_simple: Vec<i32>,
    pub status_rich: Vec<i32>,
    pub prob_toys: f64,
    pub prob_asymptotic: f64,
}

/// Toy distribution of the goodness-of-fit chi-square.
#[derive(Debug, Clone)]
pub struct GofToyReport {
    pub name: String,
    /// Observed chi-square (not divided by the degrees of freedom).
    pub observed_chi2: f64,
    pub toy_chi2: Vec<f64>,
}

/// One model fitted to the category data.
pub struct SingleFitReport<'a> {
    pub name: String,
    pub model: &'a Model,
    pub data: &'a BinnedDataset,
    pub chi2: f64,
    pub gof_prob: f64,
    pub status: i32,
    pub blind: Option<BlindWindow>,
}

/// Every envelope function for a category, with the chosen one highlighted.
pub struct EnvelopeReport<'a> {
    pub name: String,
    pub category: &'a str,
    pub models: &'a [Model],
    pub best: usize,
    pub data: &'a BinnedDataset,
    pub blind: Option<BlindWindow>,
}

/// Sink for diagnostic material produced during selection.
pub trait Diagnostics {
    fn nested_toys(&mut self, report: &NestedToyReport);
    fn gof_toys(&mut self, report: &GofToyReport);
    fn single_fit(&mut self, report: &SingleFitReport<'_>);
    fn envelope(&mut self, report: &EnvelopeReport<'_>);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDiagnostics;

impl Diagnostics for NoDiagnostics {
    fn nested_toys(&mut self, _report: &NestedToyReport) {}
    fn gof_toys(&mut self, _report: &GofToyReport) {}
    fn single_fit(&mut self, _report: &SingleFitReport<'_>) {}
    fn envelope(&mut self, _report: &EnvelopeReport<'_>) {}
}

/// Records report names; lets tests check which plots would be produced.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingDiagnostics {
    pub names: Vec<String>,
    pub nested: Vec<NestedToyReport>,
    /// `(plot name, GOF probability)` of every single-fit report.
    pub single_fits: Vec<(String, f64)>,
}

#[cfg(test)]
impl Diagnostics for RecordingDiagnostics {
    fn nested_toys(&mut self, report: &NestedToyReport) {
        self.names.push(report.name.clone());
        self.nested.push(report.clone());
    }

    fn gof_toys(&mut self, report: &GofToyReport) {
        self.names.push(report.name.clone());
    }

    fn single_fit(&mut self, report: &SingleFitReport<'_>) {
        self.names.push(report.name.clone());
        self.single_fits.push((report.name.clone(), report.gof_prob));
    }

    fn envelope(&mut self, report: &EnvelopeReport<'_>) {
        self.names.push(report.name.clone());
    }
}
