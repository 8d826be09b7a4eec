//! Resolved command implementation
//!
//! Record how the operator wants a failed hook handled. The next `steward
//! run` either retries the hook or commits it without running it.

use anyhow::{Result, bail};
use clap::Args;
use owo_colors::OwoColorize;
use steward_engine::{Kind, ResolvedMode, Step};

use crate::command::Command;
use crate::common::RuntimeContext;

/// Mark a failed hook as resolved
#[derive(Debug, Args)]
pub struct ResolvedCommand {
    /// Run the failed hook again instead of skipping it
    #[arg(long)]
    pub retry: bool,
}

impl ResolvedCommand {
    fn mode(&self) -> ResolvedMode {
        if self.retry {
            ResolvedMode::RetryHooks
        } else {
            ResolvedMode::NoHooks
        }
    }
}

impl Command for ResolvedCommand {
    fn execute(&self, context: &RuntimeContext) -> Result<()> {
        let state = context.store.load_state()?;
        let (Kind::RunHook, Step::Pending, Some(hook)) = (state.kind, state.step, &state.hook)
        else {
            bail!("No failed hook to resolve (state: {state})");
        };

        let mode = self.mode();
        context.store.set_resolved_mode(mode)?;

        println!("{} {hook} as {mode}", "Resolved".green().bold());
        println!("Run {} to continue", "steward run".cyan());
        Ok(())
    }
}
