//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - function families and the run configuration (`FunctionFamily`, `FtestConfig`)
//! - datasets and their binned view (`Dataset`, `BinnedDataset`)
//! - fit and test outcomes (`FitResult`, `NestedTestOutcome`, `GofOutcome`)
//! - per-category bookkeeping (`PerCategoryChoice`, `ResultRow`)

pub mod types;

pub use types::*;
