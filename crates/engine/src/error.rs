//! Error types for the operation engine
//!
//! `OperationError` is the closed set of outcomes a phase can report besides
//! a plain new state. Callers match on the variant, never on the message.

use crate::state::State;
use steward_core::HookInfo;
use thiserror::Error;

/// Errors returned by `Operation` phases
#[derive(Error, Debug)]
pub enum OperationError {
    /// A collaborator failed; the message is surfaced unchanged
    #[error(transparent)]
    Collaborator(#[from] steward_core::Error),

    /// Prepare of a skip operation: do not execute, go straight to commit
    #[error("hook execution skipped")]
    SkipExecute,

    /// The hook ran and failed
    #[error("hook \"{hook}\" failed: {source}")]
    HookFailed {
        hook: String,
        #[source]
        source: steward_core::Error,
    },

    /// The hook asked for a reboot; `state` must be persisted before stopping
    #[error("hook \"{hook}\" requires reboot")]
    NeedsReboot { hook: String, state: Box<State> },

    /// The hook identity is structurally invalid
    #[error("invalid hook identity: {reason}")]
    InvalidHook { reason: String },

    /// Execute was called without a successful prepare
    #[error("hook {hook} has not been prepared")]
    NotPrepared { hook: HookInfo },

    /// The persisted state cannot be resumed
    #[error("cannot resume operation state: {reason}")]
    InvalidState { reason: String },
}

impl OperationError {
    /// Whether this is the skip signal rather than a failure
    pub fn is_skip(&self) -> bool {
        matches!(self, OperationError::SkipExecute)
    }

    /// State that accompanies the error and must still be persisted
    pub fn pending_state(&self) -> Option<&State> {
        match self {
            OperationError::NeedsReboot { state, .. } => Some(state.as_ref()),
            _ => None,
        }
    }
}

/// Errors returned by the executor loop
#[derive(Error, Debug)]
pub enum ExecutorError {
    /// An operation phase failed
    #[error(transparent)]
    Operation(#[from] OperationError),

    /// The persisted state or resolution marker could not be read
    #[error("failed to load operation state: {0}")]
    Load(#[source] steward_core::Error),

    /// The state returned by a phase could not be written
    #[error("failed to persist operation state: {0}")]
    Persist(#[source] steward_core::Error),

    /// A hook failed earlier and nobody has resolved it yet
    #[error("hook {hook} failed and is awaiting resolution")]
    AwaitingResolution { hook: HookInfo },
}

impl ExecutorError {
    /// Whether the host must reboot before work continues
    pub fn needs_reboot(&self) -> bool {
        matches!(
            self,
            ExecutorError::Operation(OperationError::NeedsReboot { .. })
        )
    }
}
