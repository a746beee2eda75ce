//! Error types shared across the Tycho core.
//!
//! Two tiers of failure exist in this crate. Structural violations
//! (uninitialized pools, duplicate reservation ids, out-of-order
//! construction calls) surface as `TychoError` values and are never
//! retried automatically. Run-stage outcomes are *not* errors: they are
//! reported through [`crate::usecase::StageCompletion`] so the session
//! executor can decide policy without unwinding the use-case tree.

use thiserror::Error;

/// Result type used throughout the Tycho core
pub type TychoResult<T> = Result<T, TychoError>;

/// Errors raised by the Tycho core
#[derive(Error, Debug)]
pub enum TychoError {
    /// A precondition on the component's lifecycle was violated
    #[error("Precondition violated: {0}")]
    Precondition(String),

    /// Invalid input provided by the caller
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TychoError {
    /// Create a precondition-violation error
    pub fn precondition(msg: impl Into<String>) -> Self {
        TychoError::Precondition(msg.into())
    }

    /// Create an invalid-input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        TychoError::InvalidInput(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        TychoError::Config(msg.into())
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        TychoError::Serialization(msg.into())
    }
}
