//! Mathematical utilities: polynomial bases, chi-square probabilities and
//! covariance algebra.

pub mod basis;
pub mod chi2;
pub mod linalg;

pub use basis::*;
pub use chi2::*;
pub use linalg::*;
