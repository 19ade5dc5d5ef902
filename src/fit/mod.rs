//! Fitting.
//!
//! Responsibilities:
//!
//! - the [`FitEngine`] contract the selection logic is written against
//! - bounded retries with randomized restarts
//! - parameter snapshots that always restore
//! - the shipped Nelder–Mead engine

pub mod engine;
pub mod simplex;
pub mod snapshot;

pub use engine::*;
pub use simplex::*;
pub use snapshot::*;
