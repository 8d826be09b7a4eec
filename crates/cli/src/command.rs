//! Command trait for the steward CLI
//!
//! Every subcommand implements [`Command`], receiving the shared
//! [`RuntimeContext`] with the loaded config and opened state store.

use crate::common::RuntimeContext;
use anyhow::Result;

/// Trait for all steward commands
pub trait Command {
    /// Execute the command with the given runtime context
    ///
    /// # Errors
    ///
    /// Returns an error describing what went wrong; hook failures and reboot
    /// requests surface as `ExecutorError` inside the chain.
    fn execute(&self, context: &RuntimeContext) -> Result<()>;
}
