//! Callback capabilities the operation engine invokes
//!
//! Each phase depends only on its own narrow trait. [`Callbacks`] is the
//! union a full hook operation needs, implemented automatically for any type
//! providing all three.

use crate::lock::Unlocker;
use crate::runner::HookContext;
use steward_core::{HookInfo, Result};

/// Side effects needed by Prepare
pub trait PrepareCallbacks {
    /// Clear the marker an operator sets when resolving a failed hook
    fn clear_resolved_flag(&self) -> Result<()>;

    /// Prepare hook-specific state and return the hook name to run
    fn prepare_hook(&self, hook: &HookInfo) -> Result<String>;
}

/// Side effects needed by Execute
pub trait ExecuteCallbacks {
    /// Take the host-wide execution lock, blocking until it is available
    fn acquire_execution_lock(&self, message: &str) -> Result<Unlocker>;

    /// The hook ran to completion (including reboot requests)
    fn notify_hook_completed(&self, hook_name: &str, context: &HookContext);

    /// The hook ran and failed
    fn notify_hook_failed(&self, hook_name: &str, context: &HookContext);
}

/// Side effects needed by Commit
pub trait CommitCallbacks {
    /// Persist durable effects of a completed hook
    fn commit_hook(&self, hook: &HookInfo) -> Result<()>;
}

/// Everything a hook operation needs across its three phases
pub trait Callbacks: PrepareCallbacks + ExecuteCallbacks + CommitCallbacks {}

impl<T> Callbacks for T where T: PrepareCallbacks + ExecuteCallbacks + CommitCallbacks {}
