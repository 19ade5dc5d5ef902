//! JSON output container.
//!
//! Holds what a downstream fit needs per category: the multi-pdf (candidate
//! models with parameters and the chosen index), the background normalization
//! and the binned and unbinned datasets. The schema is [`WorkspaceFile`].

use std::fs::File;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{BinnedDataset, Dataset, Observable, PerCategoryChoice};
use crate::error::AppError;
use crate::io::export::ensure_parent_dir;
use crate::selection::{CandidateSetRecord, CategoryResult, Normalization};

pub const INT_LUMI: f64 = 1000.0;
pub const SQRT_S: f64 = 13.0;

#[derive(Debug, Serialize)]
pub struct WorkspaceFile<'a> {
    pub tool: &'static str,
    pub generated_at: DateTime<Utc>,
    #[serde(rename = "IntLumi")]
    pub int_lumi: f64,
    #[serde(rename = "SqrtS")]
    pub sqrt_s: f64,
    pub ext: &'a str,
    pub observable: &'a Observable,
    pub categories: Vec<CategoryRecord<'a>>,
}

#[derive(Debug, Serialize)]
pub struct CategoryRecord<'a> {
    pub category: &'a str,
    pub index: usize,
    pub multipdf: CandidateSetRecord,
    pub best_index: usize,
    pub penalized_nll: &'a [f64],
    pub simple_index: usize,
    pub norm: &'a Normalization,
    pub choice: &'a PerCategoryChoice,
    pub binned: &'a BinnedDataset,
    pub unbinned: &'a Dataset,
}

impl<'a> WorkspaceFile<'a> {
    pub fn new(ext: &'a str, observable: &'a Observable, results: &'a [CategoryResult]) -> Self {
        Self {
            tool: "bkg-ftest",
            generated_at: Utc::now(),
            int_lumi: INT_LUMI,
            sqrt_s: SQRT_S,
            ext,
            observable,
            categories: results
                .iter()
                .map(|r| CategoryRecord {
                    category: &r.category,
                    index: r.index,
                    multipdf: r.multipdf.to_record(),
                    best_index: r.best.index,
                    penalized_nll: &r.best.penalized_nll,
                    simple_index: r.simple_index,
                    norm: &r.norm,
                    choice: &r.choice,
                    binned: &r.binned,
                    unbinned: &r.unbinned,
                })
                .collect(),
        }
    }
}

/// Write the container as pretty JSON.
pub fn write_workspace_json(path: &Path, workspace: &WorkspaceFile<'_>) -> Result<(), AppError> {
    ensure_parent_dir(path)?;
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create workspace JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, workspace)
        .map_err(|e| AppError::new(2, format!("Failed to write workspace JSON: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Entry, FtestConfig, FunctionFamily};
    use crate::fit::engine::testing::ScriptedEngine;
    use crate::models::StandardBuilder;
    use crate::plot::NoDiagnostics;
    use crate::selection::{ModelSelectionDriver, SearchContext};

    fn result() -> CategoryResult {
        let config = FtestConfig {
            families: vec![FunctionFamily::Exponential],
            ..FtestConfig::default()
        };
        let builder = StandardBuilder::new(config.observable.clone());
        let mut engine = ScriptedEngine::new(&[
            ("ftest_pdf_cat0_13TeV_exp1", 100.0),
            ("ftest_pdf_cat0_13TeV_exp3", 99.9),
            ("env_pdf_cat0_13TeV_exp1", 100.0),
            ("env_pdf_cat0_13TeV_exp3", 99.9),
        ]);
        let mut diag = NoDiagnostics;
        let dataset = Dataset {
            name: "data_obs_cat0".to_string(),
            observable: config.observable.clone(),
            entries: (0..50)
                .map(|i| Entry {
                    value: 111.0 + i as f64,
                    weight: 1.0,
                })
                .collect(),
        };
        let mut driver = ModelSelectionDriver::new(SearchContext {
            config: &config,
            engine: &mut engine,
            builder: &builder,
            diagnostics: &mut diag,
        });
        driver.run_category(0, "cat0", &dataset).unwrap()
    }

    #[test]
    fn container_carries_constants_and_category_objects() {
        let results = vec![result()];
        let observable = Observable::new("CMS_higgs_mass", 110.0, 170.0);
        let ws = WorkspaceFile::new("13TeV", &observable, &results);
        let json = serde_json::to_value(&ws).unwrap();

        assert_eq!(json["IntLumi"], 1000.0);
        assert_eq!(json["SqrtS"], 13.0);
        let cat = &json["categories"][0];
        assert_eq!(cat["multipdf"]["name"], "CMS_higgs_cat0_13TeV_bkgshape");
        assert_eq!(cat["multipdf"]["index_name"], "pdfindex_cat0_13TeV");
        assert_eq!(cat["norm"]["name"], "CMS_higgs_cat0_13TeV_bkgshape_norm");
        assert_eq!(cat["norm"]["max"], 150.0);
        assert_eq!(cat["binned"]["name"], "roohist_data_mass_cat0");
        assert_eq!(cat["unbinned"]["name"], "data_mass_cat0");
    }
}
