//! `bkg-ftest` library crate.
//!
//! Background-function model selection for a blinded mass spectrum: per
//! category and function family, an F-test over increasing order picks the
//! "truth" order, an envelope of acceptable functions is assembled into a
//! discrete multi-pdf, and the best index is chosen by penalized likelihood.
//!
//! The binary (`ftest`) is a thin wrapper around this library so that:
//!
//! - the selection engine is testable without spawning processes
//! - fit engine, function builder and diagnostics stay swappable behind traits

pub mod app;
pub mod cli;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod plot;
pub mod report;
pub mod selection;
pub mod stats;
