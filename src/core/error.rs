//! Error types for stepgate operations.
//!
//! This module defines the canonical error type used throughout stepgate.
//! All subsystems return `Result<T, StepgateError>` for error handling.

use std::io;
use thiserror::Error;

/// Canonical error type for all stepgate operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
/// Variants map onto the exit-code taxonomy via [`StepgateError::exit_code`].
#[derive(Error, Debug)]
pub enum StepgateError {
    /// I/O error (auto-converts from `std::io::Error`)
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// JSON (de)serialization error (auto-converts from `serde_json::Error`)
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// A precondition for running the pipeline was not met.
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// A gating invariant was violated and could not be safely reverted.
    #[error("Invariant violated: {0}")]
    Invariant(String),

    /// A path fell outside the repository or outside a step's allowlist.
    #[error("Path policy violation: {0}")]
    PathPolicy(String),

    /// A produced artifact failed validator checks.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A resource the pipeline expected to exist was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A VCS adapter invocation failed.
    #[error("VCS error: {0}")]
    Vcs(String),

    /// An unexpected internal state; always indicates a bug.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StepgateError {
    /// Maps this error onto the process exit code taxonomy (see CLI surface docs).
    pub fn exit_code(&self) -> i32 {
        match self {
            StepgateError::Precondition(_) => 3,
            StepgateError::Invariant(_) => 4,
            StepgateError::PathPolicy(_) => 5,
            StepgateError::Validation(_) => 6,
            StepgateError::NotFound(_)
            | StepgateError::Vcs(_)
            | StepgateError::IoError(_)
            | StepgateError::JsonError(_)
            | StepgateError::Internal(_) => 8,
        }
    }
}
