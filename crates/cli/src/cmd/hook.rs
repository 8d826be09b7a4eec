//! Hook command implementation
//!
//! Run one lifecycle hook and everything it queues.

use anyhow::{Context, Result};
use clap::Args;
use owo_colors::OwoColorize;
use steward_core::{HookInfo, HookKind};
use tracing::info;

use crate::command::Command;
use crate::common::RuntimeContext;

/// Run a lifecycle hook
#[derive(Debug, Args)]
pub struct HookCommand {
    /// Hook kind, e.g. install, config-changed, relation-joined
    #[arg(value_name = "KIND")]
    pub kind: HookKind,

    /// Relation the hook fires for (relation hooks only)
    #[arg(long, value_name = "ID")]
    pub relation_id: Option<i64>,

    /// Remote unit that triggered the hook (joined, changed, departed)
    #[arg(long, value_name = "UNIT")]
    pub remote_unit: Option<String>,
}

impl HookCommand {
    /// Hook identity described by the arguments
    pub fn hook_info(&self) -> HookInfo {
        HookInfo {
            kind: self.kind,
            relation_id: self.relation_id,
            remote_unit: self.remote_unit.clone(),
        }
    }
}

impl Command for HookCommand {
    fn execute(&self, context: &RuntimeContext) -> Result<()> {
        let hook = self.hook_info();
        let factory = context.factory()?;
        let mut executor = context.executor()?;

        let resumed = executor
            .drain(&factory)
            .context("Cannot run a new hook until earlier work completes")?;
        if resumed > 0 {
            info!(operations = resumed, "Finished pending work");
        }

        let mut op = factory
            .new_run_hook(hook.clone())
            .with_context(|| format!("Cannot run {hook} hook"))?;
        executor.run(op.as_mut())?;
        let queued = executor.drain(&factory)?;

        println!("{} {hook}", "Completed".green().bold());
        if queued > 0 {
            println!("  {} queued hook(s) also completed", queued.to_string().cyan());
        }
        Ok(())
    }
}
