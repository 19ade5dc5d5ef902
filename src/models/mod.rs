//! Background function families.
//!
//! Models are small value types (family, order, parameter vector); shape
//! evaluation lives in pure functions so that the fit engine stays generic.

pub mod builder;
pub mod model;
pub mod shape;

pub use builder::*;
pub use model::*;
pub use shape::*;
