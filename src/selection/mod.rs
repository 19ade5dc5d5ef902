//! Model selection: order search, the discrete multi-pdf and best-index choice.
//!
//! Every component here works against three collaborators passed in a
//! [`SearchContext`]: a fit engine, a model builder and a diagnostics sink.
//! The configuration is read-only.

pub mod best_index;
pub mod driver;
pub mod multipdf;
pub mod order_search;

pub use best_index::*;
pub use driver::*;
pub use multipdf::*;
pub use order_search::*;

use crate::domain::FtestConfig;
use crate::fit::FitEngine;
use crate::models::ModelBuilder;
use crate::plot::Diagnostics;

/// Collaborators shared by every step of a run.
pub struct SearchContext<'a> {
    pub config: &'a FtestConfig,
    pub engine: &'a mut dyn FitEngine,
    pub builder: &'a dyn ModelBuilder,
    pub diagnostics: &'a mut dyn Diagnostics,
}
