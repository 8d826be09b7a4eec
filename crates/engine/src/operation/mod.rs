//! Operations
//!
//! An operation is one attempt to process a single hook through the
//! three-phase protocol:
//!
//! 1. **Prepare** - build what execution needs; yields `RunHook/Pending`
//! 2. **Execute** - run the hook under the execution lock; yields `Done`
//!    (or `Queued` when a reboot requeues the hook)
//! 3. **Commit** - persist the hook's effects and decide what to queue next
//!
//! Every phase consumes the last persisted [`State`] and returns the next one.
//! A phase that fails returns no state, so nothing is persisted and the phase
//! is retried from the previous state.
//!
//! ## Module Organization
//!
//! - `callbacks`: narrow per-phase capability traits
//! - `factory`: builds run, retry and skip operations
//! - `runhook`: the hook operation itself

pub mod callbacks;
pub mod factory;
pub mod runhook;

use crate::error::OperationError;
use crate::state::State;
use std::fmt;

pub use callbacks::{Callbacks, CommitCallbacks, ExecuteCallbacks, PrepareCallbacks};
pub use factory::Factory;
pub use runhook::{HookVariant, RunHook};

/// A single unit of work driven by the executor
pub trait Operation: fmt::Display {
    /// Prepare the operation; a skip operation returns [`OperationError::SkipExecute`]
    fn prepare(&mut self, state: &State) -> Result<State, OperationError>;

    /// Execute the operation
    fn execute(&mut self, state: &State) -> Result<State, OperationError>;

    /// Commit the operation's results
    fn commit(&mut self, state: &State) -> Result<State, OperationError>;
}
