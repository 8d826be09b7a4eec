//! Run command implementation
//!
//! Resume persisted work after a restart, reboot or resolution.

use anyhow::Result;
use clap::Args;
use owo_colors::OwoColorize;

use crate::command::Command;
use crate::common::RuntimeContext;

/// Resume persisted work until the unit is idle
#[derive(Debug, Args)]
pub struct RunCommand {}

impl Command for RunCommand {
    fn execute(&self, context: &RuntimeContext) -> Result<()> {
        let factory = context.factory()?;
        let mut executor = context.executor()?;

        let processed = executor.drain(&factory)?;
        if processed == 0 {
            println!("{}", "Nothing to do".dimmed());
        } else {
            println!(
                "{} {} operation(s), state {}",
                "Processed".green().bold(),
                processed,
                executor.state()
            );
        }
        Ok(())
    }
}
