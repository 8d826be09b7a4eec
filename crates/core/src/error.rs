//! Base error types for steward
//!
//! This module provides the foundation error type used by every collaborator
//! the operation engine talks to. The engine treats these errors as opaque and
//! propagates them verbatim.

use thiserror::Error;

/// Base error type for shared functionality
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Hook identity is structurally invalid
    #[error("Invalid hook: {0}")]
    InvalidHook(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// State persistence error
    #[error("State error: {0}")]
    State(String),

    /// Hook execution error
    #[error("Hook execution error: {0}")]
    HookExecution(String),

    /// Execution lock error
    #[error("Lock error: {0}")]
    Lock(String),

    /// Generic error message
    #[error("{0}")]
    Message(String),

    /// Other error with context
    #[error("{context}: {source}")]
    Other {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl Error {
    /// Create an error with additional context
    #[must_use]
    pub fn context(self, context: impl Into<String>) -> Self {
        Error::Other {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
