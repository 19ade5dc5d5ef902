//! Input/output helpers.
//!
//! - CSV ingest + validation (`ingest`)
//! - text exports: results table and bias summary (`export`)
//! - JSON output container (`workspace`)

pub mod export;
pub mod ingest;
pub mod workspace;

pub use export::*;
pub use ingest::*;
pub use workspace::*;
