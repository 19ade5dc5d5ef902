//! Shared selection pipeline used by the `run` and `scan` commands.
//!
//! ingest -> per category: bin -> truth/envelope search -> multi-pdf -> best index
//!
//! A category that fails (missing dataset, no envelope candidate) is recorded
//! and the remaining categories still run; `finish` turns the recorded
//! failures into the process error afterwards.

use tracing::{error, info};

use crate::domain::{FtestConfig, ResultRow};
use crate::error::AppError;
use crate::fit::SimplexEngine;
use crate::io::{IngestedData, OutputPaths, load_category_data};
use crate::models::StandardBuilder;
use crate::plot::{Diagnostics, NoDiagnostics, SvgDiagnostics};
use crate::selection::{CategoryResult, ModelSelectionDriver, SearchContext};

/// A category that could not be processed.
#[derive(Debug, Clone)]
pub struct CategoryFailure {
    pub category: String,
    pub error: AppError,
}

/// Outputs of a full `run`.
#[derive(Debug)]
pub struct SelectionRun {
    pub results: Vec<CategoryResult>,
    pub failures: Vec<CategoryFailure>,
}

/// Outputs of a `scan`: truth rows per processed category.
#[derive(Debug)]
pub struct ScanRun {
    pub rows: Vec<Vec<ResultRow>>,
    pub failures: Vec<CategoryFailure>,
}

fn engine(config: &FtestConfig) -> SimplexEngine {
    SimplexEngine::new(config.toy_seed)
        .with_max_iters(config.max_fit_iters)
        .with_sum_w2_error(config.sum_w2_error)
}

fn ingest(config: &FtestConfig) -> Result<IngestedData, AppError> {
    let data = load_category_data(&config.input, &config.observable)?;
    info!(
        path = %config.input.display(),
        rows = data.rows_read,
        categories = data.datasets.len(),
        "loaded observations"
    );
    Ok(data)
}

/// Full selection over every selected category.
pub fn run_selection(config: &FtestConfig) -> Result<SelectionRun, AppError> {
    let data = ingest(config)?;
    let paths = OutputPaths::new(config);

    let mut engine = engine(config);
    let builder = StandardBuilder::new(config.observable.clone());
    let mut diagnostics: Box<dyn Diagnostics> = if config.plots {
        Box::new(SvgDiagnostics::new(paths.plots))
    } else {
        Box::new(NoDiagnostics)
    };
    let mut driver = ModelSelectionDriver::new(SearchContext {
        config,
        engine: &mut engine,
        builder: &builder,
        diagnostics: diagnostics.as_mut(),
    });

    let mut results = Vec::new();
    let mut failures = Vec::new();
    for (index, category) in config.selected_categories() {
        let outcome = data
            .dataset(category)
            .and_then(|dataset| driver.run_category(index, category, dataset));
        match outcome {
            Ok(result) => results.push(result),
            Err(error) => {
                error!(category, code = error.exit_code(), "{error}");
                failures.push(CategoryFailure {
                    category: category.to_string(),
                    error,
                });
            }
        }
    }

    Ok(SelectionRun { results, failures })
}

/// Truth-order search only; no plots, no exports.
pub fn run_scan(config: &FtestConfig) -> Result<ScanRun, AppError> {
    let data = ingest(config)?;

    let mut engine = engine(config);
    let builder = StandardBuilder::new(config.observable.clone());
    let mut diagnostics = NoDiagnostics;
    let mut driver = ModelSelectionDriver::new(SearchContext {
        config,
        engine: &mut engine,
        builder: &builder,
        diagnostics: &mut diagnostics,
    });

    let mut rows = Vec::new();
    let mut failures = Vec::new();
    for (_, category) in config.selected_categories() {
        let outcome = data
            .dataset(category)
            .and_then(|dataset| driver.scan_category(category, dataset));
        match outcome {
            Ok(truths) => rows.push(truths.into_iter().map(|t| t.row).collect()),
            Err(error) => {
                error!(category, code = error.exit_code(), "{error}");
                failures.push(CategoryFailure {
                    category: category.to_string(),
                    error,
                });
            }
        }
    }

    Ok(ScanRun { rows, failures })
}

/// Map recorded category failures onto the run result (first failure's exit code).
pub fn finish(failures: Vec<CategoryFailure>) -> Result<(), AppError> {
    let Some(first) = failures.first() else {
        return Ok(());
    };
    if failures.len() == 1 {
        return Err(first.error.clone());
    }
    let names: Vec<&str> = failures.iter().map(|f| f.category.as_str()).collect();
    Err(AppError::new(
        first.error.exit_code(),
        format!("{} categories failed ({}); first error: {}", failures.len(), names.join(", "), first.error),
    ))
}
