//! Application error type.
//!
//! Every fallible path in the crate returns `Result<T, AppError>`. The exit code
//! travels with the message so `main` can map failures onto process status:
//!
//! - `2` configuration, usage or I/O failure
//! - `3` insufficient data (empty dataset, empty envelope)
//! - `4` numerical failure (non-finite likelihood, degenerate model)
//! - `5` missing category dataset or observable

use thiserror::Error;

#[derive(Clone, Error)]
#[error("{message}")]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}
