//! Steward CLI library
//!
//! All CLI logic lives here so it can be exercised from tests.

pub mod cmd;
pub mod command;
pub mod common;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use steward_config::Config;
use steward_engine::ExecutorError;

use command::Command;
use common::RuntimeContext;

/// Exit status when a hook asked for a reboot
pub const EXIT_REBOOT: i32 = 2;

/// Steward - run lifecycle hooks for a deployed unit
#[derive(Parser)]
#[command(name = "steward")]
#[command(about = "Run lifecycle hooks for a deployed unit")]
#[command(version)]
#[command(long_about = "Run lifecycle hooks for a deployed unit

Every hook goes through prepare, execute and commit. Progress is persisted
after each phase, so an interrupted agent resumes exactly where it stopped,
and hooks on one machine never run concurrently.")]
pub struct Cli {
    /// Path to the config file
    #[arg(long, env = "STEWARD_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Override the state directory from the config file
    #[arg(long, env = "STEWARD_STATE_DIR", value_name = "DIR")]
    pub state_dir: Option<PathBuf>,

    /// Enable verbose output (shows DEBUG level logs)
    #[arg(short, long)]
    pub verbose: bool,

    /// Write logs to a file
    #[arg(long, env = "STEWARD_LOG_FILE", value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run a lifecycle hook, then any hooks it queues
    #[command(long_about = "Run a lifecycle hook, then any hooks it queues

Pending work from earlier runs is finished first. Committing install or
upgrade-charm queues config-changed; the first config-changed queues start.

Examples:
  • steward hook install
  • steward hook relation-joined --relation-id 2 --remote-unit mysql/0
  • steward hook relation-broken --relation-id 2")]
    Hook(cmd::hook::HookCommand),

    /// Resume persisted work until the unit is idle
    Run(cmd::run::RunCommand),

    /// Mark a failed hook as resolved
    Resolved(cmd::resolved::ResolvedCommand),

    /// Show operation state, relations and recent hooks
    Status(cmd::status::StatusCommand),
}

fn load_config(cli: &Cli) -> Result<Config> {
    let path = cli
        .config
        .clone()
        .or_else(steward_config::default_config_file)
        .ok_or_else(|| {
            anyhow::anyhow!("Could not determine config file. Please specify with --config.")
        })?;

    let mut config = Config::load(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;

    if let Some(state_dir) = &cli.state_dir {
        config.paths.state_dir = Some(state_dir.clone());
    }
    Ok(config)
}

fn execute_command(command: &Commands, context: &RuntimeContext) -> Result<()> {
    match command {
        Commands::Hook(cmd) => cmd.execute(context),
        Commands::Run(cmd) => cmd.execute(context),
        Commands::Resolved(cmd) => cmd.execute(context),
        Commands::Status(cmd) => cmd.execute(context),
    }
}

/// Process exit status for an error returned by [`run`]
pub fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<ExecutorError>() {
        Some(e) if e.needs_reboot() => EXIT_REBOOT,
        _ => 1,
    }
}

/// # Errors
///
/// Returns an error if:
/// - Logging initialization fails
/// - Configuration loading fails
/// - The state database cannot be opened
/// - Command execution fails
pub fn run(cli: Cli) -> Result<()> {
    steward_config::logging::init(cli.verbose, cli.log_file.as_deref())?;

    let config = load_config(&cli)?;
    let context = RuntimeContext::new(config)?;

    execute_command(&cli.command, &context)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use clap::CommandFactory;
    use steward_core::HookKind;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_relation_hook() {
        let cli = Cli::try_parse_from([
            "steward",
            "--config",
            "/etc/steward.toml",
            "hook",
            "relation-joined",
            "--relation-id",
            "2",
            "--remote-unit",
            "mysql/0",
        ])
        .unwrap();

        let Commands::Hook(cmd) = cli.command else {
            panic!("expected hook command");
        };
        assert_eq!(cmd.kind, HookKind::RelationJoined);
        assert_eq!(cmd.relation_id, Some(2));
        assert_eq!(cmd.remote_unit.as_deref(), Some("mysql/0"));
    }

    #[test]
    fn test_parse_rejects_unknown_hook() {
        assert!(Cli::try_parse_from(["steward", "hook", "bogus"]).is_err());
    }

    #[test]
    fn test_exit_code_for_reboot() {
        let reboot = anyhow::Error::new(ExecutorError::from(
            steward_engine::OperationError::NeedsReboot {
                hook: "install".to_string(),
                state: Box::default(),
            },
        ))
        .context("hook run interrupted");
        assert_eq!(exit_code(&reboot), EXIT_REBOOT);
        assert_eq!(exit_code(&anyhow::anyhow!("boom")), 1);
    }
}
