//! Hypothesis tests used by the order search: toys, the nested-model F-test
//! and the standalone goodness-of-fit test.

pub mod gof;
pub mod nested;
pub mod toys;

pub use gof::*;
pub use nested::*;
pub use toys::*;
