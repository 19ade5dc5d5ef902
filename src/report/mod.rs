//! Reporting: the results table, the bias-study summary and console output.

pub mod format;

pub use format::*;
