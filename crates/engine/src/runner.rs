//! Hook runners
//!
//! A runner executes the content of one hook. The operation engine only sees
//! the typed outcome: success, missing, a reboot request, or failure.

use serde::{Deserialize, Serialize};
use std::fmt;
use steward_core::HookInfo;
use thiserror::Error;

/// Execution context built for one hook invocation
///
/// Carried into completed/failed notifications for observability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookContext {
    /// Unique id of this invocation
    pub id: String,

    /// Unit the hook runs for
    pub unit_name: String,

    /// Relation id, for relation hooks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation_id: Option<i64>,

    /// Relation endpoint name, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation_name: Option<String>,

    /// Remote unit that triggered the hook
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_unit: Option<String>,
}

impl HookContext {
    /// Context with only an id and unit name
    pub fn new(id: impl Into<String>, unit_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            unit_name: unit_name.into(),
            relation_id: None,
            relation_name: None,
            remote_unit: None,
        }
    }
}

impl fmt::Display for HookContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Outcomes of running a hook other than plain success
#[derive(Error, Debug)]
pub enum RunnerError {
    /// The charm does not implement this hook
    #[error("charm does not implement hook \"{hook}\"")]
    Missing { hook: String },

    /// Reboot now; the hook must run again afterwards
    #[error("reboot requested, hook will be requeued")]
    RequeueAndReboot,

    /// Reboot once the hook has finished
    #[error("reboot requested after hook completion")]
    Reboot,

    /// Any other failure
    #[error(transparent)]
    Failed(#[from] steward_core::Error),
}

/// Executes a single prepared hook
pub trait Runner {
    /// Context built for this invocation
    fn context(&self) -> &HookContext;

    /// Run the hook with the given name
    fn run_hook(&mut self, hook_name: &str) -> Result<(), RunnerError>;
}

/// Builds runners bound to a hook identity
pub trait RunnerFactory {
    /// Create a runner for `hook`
    fn new_hook_runner(&self, hook: &HookInfo) -> steward_core::Result<Box<dyn Runner>>;
}
